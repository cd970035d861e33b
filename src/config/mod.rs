mod file_config;

pub use file_config::{FileConfig, MatchingConfig};

use crate::acquisition::{ToolSpec, DEFAULT_SESSION_TIMEOUT, DEFAULT_SETTLE_DELAY};
use crate::catalog::SpotifySettings;
use crate::matching::MatchThresholds;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default pause between two acquired tracks in a batch.
pub const DEFAULT_TRACK_DELAY: Duration = Duration::from_millis(500);
/// Default pause between playlist scans during a full sync.
pub const DEFAULT_PLAYLIST_DELAY: Duration = Duration::from_secs(2);

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub library_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub library_dir: PathBuf,
    pub db_path: PathBuf,
    pub port: u16,
    pub track_delay: Duration,
    pub playlist_delay: Duration,
    pub session_timeout: Duration,
    pub settle_delay: Duration,

    // Feature configs (with defaults)
    pub thresholds: MatchThresholds,
    pub spotify: SpotifySettings,
    pub beatport_tool: Option<ToolSpec>,
    pub tidal_tool: Option<ToolSpec>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let library_dir = file
            .library_dir
            .map(PathBuf::from)
            .or_else(|| cli.library_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("library_dir must be specified via --library-dir or in config file")
            })?;

        if library_dir.exists() && !library_dir.is_dir() {
            bail!("library_dir is not a directory: {:?}", library_dir);
        }

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| library_dir.join("cratekeeper.db"));

        let port = file.port.unwrap_or(cli.port);

        let track_delay = file
            .track_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TRACK_DELAY);
        let playlist_delay = file
            .playlist_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PLAYLIST_DELAY);
        let session_timeout = file
            .session_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SESSION_TIMEOUT);
        let settle_delay = file
            .settle_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SETTLE_DELAY);

        // Matching thresholds - merge file config with defaults
        let matching_file = file.matching.unwrap_or_default();
        let defaults = MatchThresholds::default();
        let thresholds = MatchThresholds {
            strict: matching_file.strict.unwrap_or(defaults.strict),
            relaxed: matching_file.relaxed.unwrap_or(defaults.relaxed),
            floor: matching_file.floor.unwrap_or(defaults.floor),
        };
        if !(0.0..=1.0).contains(&thresholds.strict)
            || !(0.0..=1.0).contains(&thresholds.relaxed)
            || !(0.0..=1.0).contains(&thresholds.floor)
        {
            bail!("Matching thresholds must be between 0.0 and 1.0");
        }
        if thresholds.relaxed > thresholds.strict {
            bail!("Relaxed matching threshold cannot exceed the strict one");
        }

        Ok(Self {
            library_dir,
            db_path,
            port,
            track_delay,
            playlist_delay,
            session_timeout,
            settle_delay,
            thresholds,
            spotify: file.spotify.unwrap_or_default(),
            beatport_tool: file.beatport_tool,
            tidal_tool: file.tidal_tool,
        })
    }
}
