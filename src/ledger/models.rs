//! Ledger data models.

use crate::catalog::SourceService;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Which acquisition backend produced the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPlatform {
    Beatport,
    Tidal,
}

impl DownloadPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadPlatform::Beatport => "beatport",
            DownloadPlatform::Tidal => "tidal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beatport" => Some(DownloadPlatform::Beatport),
            "tidal" => Some(DownloadPlatform::Tidal),
            _ => None,
        }
    }
}

/// Lifecycle of a ledger entry.
///
/// Allowed transitions: pending → downloading → {completed, failed};
/// completed → synced (driven by the external USB sync collaborator).
/// Failed entries and completed entries whose file disappeared may go back
/// to downloading for another attempt. Synced is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Synced,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Pending => "pending",
            TrackStatus::Downloading => "downloading",
            TrackStatus::Completed => "completed",
            TrackStatus::Failed => "failed",
            TrackStatus::Synced => "synced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TrackStatus::Pending),
            "downloading" => Some(TrackStatus::Downloading),
            "completed" => Some(TrackStatus::Completed),
            "failed" => Some(TrackStatus::Failed),
            "synced" => Some(TrackStatus::Synced),
            _ => None,
        }
    }

    /// Whether a transition from self to `next` is legal.
    pub fn can_transition_to(&self, next: TrackStatus) -> bool {
        matches!(
            (self, next),
            (TrackStatus::Pending, TrackStatus::Downloading)
                | (TrackStatus::Downloading, TrackStatus::Completed)
                | (TrackStatus::Downloading, TrackStatus::Failed)
                | (TrackStatus::Completed, TrackStatus::Synced)
                | (TrackStatus::Failed, TrackStatus::Downloading)
                | (TrackStatus::Completed, TrackStatus::Downloading)
        )
    }
}

/// One acquired (or failed) track.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub source_service: SourceService,
    pub external_id: String,
    pub download_platform: DownloadPlatform,
    pub title: String,
    pub artist: String,
    pub mix_type: Option<String>,
    pub genre_tags: Vec<String>,
    pub file_path: Option<PathBuf>,
    pub status: TrackStatus,
    pub downloaded_at: Option<i64>,
    pub synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Optional fields applied alongside a status update.
#[derive(Debug, Clone, Default)]
pub struct LedgerPatch {
    pub file_path: Option<PathBuf>,
    pub mix_type: Option<String>,
    pub genre_tags: Option<Vec<String>>,
}

/// Aggregate counts over the whole ledger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub by_source_service: HashMap<String, usize>,
    pub by_download_platform: HashMap<String, usize>,
    pub by_status: HashMap<String, usize>,
}
