//! Acquisition backends.
//!
//! A backend drives an external interactive download tool over stdin/stdout:
//! it submits a search query, parses the numbered result list, picks the best
//! candidate with the similarity matcher and sends the selection back. The
//! downloaded file is detected by diffing the tool's output directory and is
//! then relocated into the genre-classified library folder.

mod relocate;
mod session;

pub use relocate::{find_new_file, relocate, snapshot_dir};
pub use session::{SessionState, ToolSession};

use crate::catalog::DesiredTrack;
use crate::ledger::DownloadPlatform;
use crate::matching::{self, Candidate, MatchThresholds};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

lazy_static! {
    // "  3. Artist Name - Track Title" or "3) Artist Name - Track Title"
    static ref CANDIDATE_LINE: Regex =
        Regex::new(r"(?m)^\s*(\d+)[.)]\s+(.+?)\s+-\s+(.+?)\s*$").unwrap();
}

/// Default per-track session timeout.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default wait after the tool reports success, so the file is fully flushed.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("backend is not configured")]
    NotConfigured,
    #[error("search returned no usable results")]
    NoSearchResults,
    #[error("no candidate met the similarity thresholds")]
    NoAcceptableMatch,
    #[error("tool session timed out")]
    Timeout,
    #[error("tool failure: {0}")]
    Tool(String),
    #[error("tool reported success but no new file appeared in its output directory")]
    MissingOutput,
    #[error("file relocation failed: {0}")]
    Relocation(#[source] anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How to run one interactive download tool.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ToolSpec {
    pub bin: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Where the tool drops finished downloads.
    pub output_dir: PathBuf,
    /// Text the tool prints when it is ready for a selection.
    pub prompt_marker: String,
    /// Any of these after the selection means the download finished.
    pub success_markers: Vec<String>,
    /// Any of these after the selection means the download failed.
    #[serde(default)]
    pub failure_markers: Vec<String>,
}

/// A successfully acquired track, already relocated into the library.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub file_path: PathBuf,
    pub platform: DownloadPlatform,
    pub mix_type: Option<String>,
    pub match_score: f64,
}

/// Something that can turn a desired track into a file on disk.
#[async_trait]
pub trait AcquisitionBackend: Send + Sync {
    fn platform(&self) -> DownloadPlatform;

    /// Unconfigured backends are skipped in the fallback chain.
    fn is_configured(&self) -> bool;

    /// Acquire one track and relocate the file into `dest_dir`.
    async fn acquire(
        &self,
        track: &DesiredTrack,
        dest_dir: &Path,
    ) -> Result<Acquisition, AcquireError>;
}

/// Backend implementation over an interactive command-line tool.
pub struct InteractiveToolBackend {
    platform: DownloadPlatform,
    spec: Option<ToolSpec>,
    thresholds: MatchThresholds,
    session_timeout: Duration,
    settle_delay: Duration,
}

impl InteractiveToolBackend {
    pub fn new(
        platform: DownloadPlatform,
        spec: Option<ToolSpec>,
        thresholds: MatchThresholds,
        session_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            platform,
            spec,
            thresholds,
            session_timeout,
            settle_delay,
        }
    }
}

#[async_trait]
impl AcquisitionBackend for InteractiveToolBackend {
    fn platform(&self) -> DownloadPlatform {
        self.platform
    }

    fn is_configured(&self) -> bool {
        self.spec.is_some()
    }

    async fn acquire(
        &self,
        track: &DesiredTrack,
        dest_dir: &Path,
    ) -> Result<Acquisition, AcquireError> {
        let spec = self.spec.as_ref().ok_or(AcquireError::NotConfigured)?;
        let artist = track.artist_label();
        let query = format!("{} {}", artist, track.title);

        let before = snapshot_dir(&spec.output_dir)?;
        let mut session = ToolSession::spawn(spec, self.session_timeout)?;
        // Give the tool a moment to print its banner before the query.
        tokio::time::sleep(self.settle_delay).await;

        let results = session.submit_query(&query).await?;
        let candidates = parse_candidates(&results);
        if candidates.is_empty() {
            debug!("No parseable results for '{}' on {}", query, self.platform.as_str());
            session.shutdown().await;
            return Err(AcquireError::NoSearchResults);
        }

        let Some(decision) =
            matching::select_with_fallback(&artist, &track.title, &candidates, self.thresholds)
        else {
            session.shutdown().await;
            return Err(AcquireError::NoAcceptableMatch);
        };
        let chosen = &candidates[decision.index];
        info!(
            "Selected '{} - {}' (score {:.2}) on {} for '{}'",
            chosen.artist,
            chosen.title,
            decision.combined_score,
            self.platform.as_str(),
            query
        );

        session.submit_selection(chosen.ordinal).await?;
        session.shutdown().await;
        tokio::time::sleep(self.settle_delay).await;

        let new_file =
            find_new_file(&spec.output_dir, &before)?.ok_or(AcquireError::MissingOutput)?;
        check_filename(&new_file, track);
        let file_path = relocate(&new_file, dest_dir).map_err(AcquireError::Relocation)?;

        Ok(Acquisition {
            file_path,
            platform: self.platform,
            mix_type: matching::extract_mix_type(&chosen.title),
            match_score: decision.combined_score,
        })
    }
}

/// Parse the tool's numbered result list into candidates.
pub fn parse_candidates(results: &str) -> Vec<Candidate> {
    CANDIDATE_LINE
        .captures_iter(results)
        .filter_map(|caps| {
            Some(Candidate {
                ordinal: caps[1].parse().ok()?,
                artist: caps[2].to_string(),
                title: caps[3].to_string(),
            })
        })
        .collect()
}

// Filenames are not authoritative, so this never rejects a file.
const FILENAME_WARN_THRESHOLD: f64 = 0.5;

/// Log-only sanity check: a filename far from the requested artist/title
/// usually means the tool downloaded something else than we selected.
fn check_filename(path: &Path, track: &DesiredTrack) {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = format!("{} {}", track.artist_label(), track.title);
    let score = matching::similarity(&name, &expected);
    if score < FILENAME_WARN_THRESHOLD {
        warn!(
            "Downloaded filename '{}' scores {:.2} against '{}', keeping it anyway",
            name, score, expected
        );
    }
}
