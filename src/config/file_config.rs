use crate::acquisition::ToolSpec;
use crate::catalog::SpotifySettings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub library_dir: Option<String>,
    pub db_path: Option<String>,
    pub port: Option<u16>,
    pub track_delay_ms: Option<u64>,
    pub playlist_delay_ms: Option<u64>,
    pub session_timeout_secs: Option<u64>,
    pub settle_delay_secs: Option<u64>,

    // Feature configs
    pub matching: Option<MatchingConfig>,
    pub spotify: Option<SpotifySettings>,
    pub beatport_tool: Option<ToolSpec>,
    pub tidal_tool: Option<ToolSpec>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    pub strict: Option<f64>,
    pub relaxed: Option<f64>,
    pub floor: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
