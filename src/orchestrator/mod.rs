//! Sync orchestration.
//!
//! The orchestrator ties everything together: it pulls desired tracks from
//! the catalog clients, consults the ledger to skip what is already on disk,
//! runs the acquisition fallback chain one track at a time, files each
//! download under its genre folder and records the outcome. A single
//! [`ProgressTracker`] guards against concurrent operations.

use crate::acquisition::AcquisitionBackend;
use crate::catalog::{CatalogClient, DesiredTrack, SourceService};
use crate::genre;
use crate::ledger::{LedgerEntry, LedgerPatch, LedgerStore, TrackStatus};
use crate::matching;
use crate::progress::{Phase, ProgressTracker};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of one track in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Acquired,
    Skipped,
    Failed,
}

/// Summary of a sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub acquired: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reclassified: usize,
}

/// Summary of a reclassification pass over the Other folder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReclassifyReport {
    pub examined: usize,
    pub moved: usize,
    pub unchanged: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    catalogs: Vec<Arc<dyn CatalogClient>>,
    backends: Vec<Arc<dyn AcquisitionBackend>>,
    ledger: Arc<dyn LedgerStore>,
    progress: ProgressTracker,
    library_root: PathBuf,
    track_delay: Duration,
    playlist_delay: Duration,
    cancel: CancellationToken,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalogs: Vec<Arc<dyn CatalogClient>>,
        backends: Vec<Arc<dyn AcquisitionBackend>>,
        ledger: Arc<dyn LedgerStore>,
        progress: ProgressTracker,
        library_root: PathBuf,
        track_delay: Duration,
        playlist_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            catalogs,
            backends,
            ledger,
            progress,
            library_root,
            track_delay,
            playlist_delay,
            cancel,
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    fn configured_catalogs(&self) -> impl Iterator<Item = &Arc<dyn CatalogClient>> {
        self.catalogs.iter().filter(|c| c.is_configured())
    }

    /// Full sync: every liked track of every configured catalog, followed by
    /// a reclassification pass over the Other folder.
    pub async fn run_full_sync(&self) -> Result<SyncReport> {
        if !self.progress.try_begin("full_sync") {
            bail!("another operation is already running");
        }
        let result = self.full_sync_inner().await;
        self.progress.finish();
        result
    }

    async fn full_sync_inner(&self) -> Result<SyncReport> {
        self.progress.set_phase(Phase::Scanning);
        let mut tracks: Vec<DesiredTrack> = Vec::new();
        let mut seen: HashSet<(SourceService, String)> = HashSet::new();
        let mut push_deduped = |found: Vec<DesiredTrack>, tracks: &mut Vec<DesiredTrack>| {
            for track in found {
                if seen.insert((track.source, track.external_id.clone())) {
                    tracks.push(track);
                }
            }
        };

        for catalog in self.configured_catalogs() {
            let service = catalog.service().as_str();
            match catalog.liked_tracks().await {
                Ok(liked) => push_deduped(liked, &mut tracks),
                // One broken catalog must not sink the whole sync.
                Err(e) => error!("Failed to scan {} liked tracks: {:#}", service, e),
            }

            let playlists = match catalog.playlists().await {
                Ok(playlists) => playlists,
                Err(e) => {
                    error!("Failed to list {} playlists: {:#}", service, e);
                    continue;
                }
            };
            for playlist in playlists {
                if self.cancel.is_cancelled() {
                    break;
                }
                match catalog.playlist_tracks(&playlist.id).await {
                    Ok(found) => push_deduped(found, &mut tracks),
                    Err(e) => error!(
                        "Failed to scan {} playlist '{}': {:#}",
                        service, playlist.name, e
                    ),
                }
                tokio::time::sleep(self.playlist_delay).await;
            }
        }
        info!("Full sync: {} desired tracks after dedup", tracks.len());

        let mut report = self.acquire_batch(&tracks, None).await?;

        self.progress.set_phase(Phase::Reclassifying);
        match self.reclassify_inner().await {
            Ok(reclassify) => report.reclassified = reclassify.moved,
            Err(e) => warn!("Reclassification pass failed: {:#}", e),
        }
        Ok(report)
    }

    /// Sync one playlist by id, resolved through the first configured
    /// catalog that knows it.
    pub async fn run_playlist_sync(&self, playlist_id: &str) -> Result<SyncReport> {
        if !self.progress.try_begin("playlist_sync") {
            bail!("another operation is already running");
        }
        let result = self.playlist_sync_inner(playlist_id).await;
        self.progress.finish();
        result
    }

    async fn playlist_sync_inner(&self, playlist_id: &str) -> Result<SyncReport> {
        self.progress.set_phase(Phase::Scanning);
        let mut resolved = None;
        for catalog in self.configured_catalogs() {
            match catalog.playlist_tracks(playlist_id).await {
                Ok(found) => {
                    // Playlist downloads go to a folder named after the
                    // playlist, not into genre folders.
                    let name = catalog
                        .playlists()
                        .await
                        .ok()
                        .and_then(|all| all.into_iter().find(|p| p.id == playlist_id))
                        .map(|p| p.name)
                        .unwrap_or_else(|| playlist_id.to_string());
                    resolved = Some((found, name));
                    break;
                }
                Err(e) => warn!(
                    "{} could not resolve playlist {}: {:#}",
                    catalog.service().as_str(),
                    playlist_id,
                    e
                ),
            }
        }
        let (tracks, name) = resolved.with_context(|| {
            format!("No configured catalog could resolve playlist {}", playlist_id)
        })?;
        info!("Playlist '{}': {} tracks", name, tracks.len());
        let dest_dir = self.library_root.join(sanitize_folder_name(&name));
        self.acquire_batch(&tracks, Some(&dest_dir)).await
    }

    /// Acquire one manually requested track. Genre tags are looked up by
    /// artist search; repeats of the same request dedup through the ledger.
    pub async fn run_single_track(&self, artist: &str, title: &str) -> Result<SyncReport> {
        if !self.progress.try_begin("single_track") {
            bail!("another operation is already running");
        }
        let result = self.single_track_inner(artist, title).await;
        self.progress.finish();
        result
    }

    async fn single_track_inner(&self, artist: &str, title: &str) -> Result<SyncReport> {
        self.progress.set_phase(Phase::Scanning);
        let mut genre_tags = Vec::new();
        let mut source = SourceService::Spotify;
        if let Some(catalog) = self.configured_catalogs().next() {
            source = catalog.service();
            match catalog.artist_genres(artist).await {
                Ok(tags) => genre_tags = tags,
                Err(e) => warn!("Genre lookup for '{}' failed: {:#}", artist, e),
            }
        }
        let track = DesiredTrack {
            external_id: format!(
                "manual:{}:{}",
                matching::normalize(artist),
                matching::normalize(title)
            ),
            title: title.to_string(),
            artists: vec![artist.to_string()],
            genre_tags,
            source,
        };
        self.acquire_batch(std::slice::from_ref(&track), None).await
    }

    /// Reclassification as a standalone operation.
    pub async fn run_reclassify(&self) -> Result<ReclassifyReport> {
        if !self.progress.try_begin("reclassify") {
            bail!("another operation is already running");
        }
        self.progress.set_phase(Phase::Reclassifying);
        let result = self.reclassify_inner().await;
        self.progress.finish();
        result
    }

    /// Sequential batch over desired tracks. Failures never abort the batch.
    /// With `dest_override` every track lands in that folder instead of its
    /// genre folder.
    async fn acquire_batch(
        &self,
        tracks: &[DesiredTrack],
        dest_override: Option<&Path>,
    ) -> Result<SyncReport> {
        self.progress.set_phase(Phase::Downloading);
        self.progress.set_total(tracks.len());

        let mut report = SyncReport {
            scanned: tracks.len(),
            ..Default::default()
        };
        for track in tracks {
            if self.cancel.is_cancelled() {
                info!("Sync cancelled, stopping after {} tracks", report.acquired);
                break;
            }
            let label = format!("{} - {}", track.artist_label(), track.title);
            self.progress.set_current_track(Some(label.clone()));

            match self.acquire_one(track, dest_override).await {
                Ok(TrackOutcome::Acquired) => {
                    report.acquired += 1;
                    self.progress.track_completed();
                    tokio::time::sleep(self.track_delay).await;
                }
                Ok(TrackOutcome::Skipped) => {
                    report.skipped += 1;
                    self.progress.track_skipped();
                }
                Ok(TrackOutcome::Failed) => {
                    report.failed += 1;
                    self.progress.track_failed();
                }
                Err(e) => {
                    // Ledger errors, not acquisition failures.
                    error!("Bookkeeping error for '{}': {:#}", label, e);
                    report.failed += 1;
                    self.progress.track_failed();
                }
            }
        }
        self.progress.set_current_track(None);
        Ok(report)
    }

    /// Acquire one track through the backend fallback chain and record the
    /// outcome in the ledger.
    async fn acquire_one(
        &self,
        track: &DesiredTrack,
        dest_override: Option<&Path>,
    ) -> Result<TrackOutcome> {
        let existing = self.ledger.find(track.source, &track.external_id)?;
        if let Some(entry) = &existing {
            match entry.status {
                TrackStatus::Synced => return Ok(TrackOutcome::Skipped),
                TrackStatus::Completed
                    if entry.file_path.as_ref().is_some_and(|p| p.exists()) =>
                {
                    return Ok(TrackOutcome::Skipped);
                }
                TrackStatus::Completed => {
                    info!(
                        "File for '{} - {}' is gone, re-acquiring",
                        track.artist_label(),
                        track.title
                    );
                }
                TrackStatus::Failed => {
                    info!(
                        "Retrying previously failed '{} - {}'",
                        track.artist_label(),
                        track.title
                    );
                }
                // Stale from an interrupted run.
                TrackStatus::Pending | TrackStatus::Downloading => {}
            }
            self.ledger
                .update_status(&entry.id, TrackStatus::Downloading, LedgerPatch::default())?;
        }

        let dest_dir = match dest_override {
            Some(dir) => dir.to_path_buf(),
            None => genre::destination_path(&self.library_root, &track.genre_tags),
        };
        let mut acquisition = None;
        for backend in &self.backends {
            if !backend.is_configured() {
                continue;
            }
            match backend.acquire(track, &dest_dir).await {
                Ok(done) => {
                    acquisition = Some(done);
                    break;
                }
                Err(e) => warn!(
                    "{} failed for '{} - {}': {}",
                    backend.platform().as_str(),
                    track.artist_label(),
                    track.title,
                    e
                ),
            }
        }

        let now = Utc::now().timestamp();
        match acquisition {
            Some(acquisition) => {
                info!(
                    "Acquired '{} - {}' via {} -> {}",
                    track.artist_label(),
                    track.title,
                    acquisition.platform.as_str(),
                    acquisition.file_path.display()
                );
                let patch = LedgerPatch {
                    file_path: Some(acquisition.file_path.clone()),
                    mix_type: acquisition.mix_type.clone(),
                    genre_tags: Some(track.genre_tags.clone()),
                };
                match &existing {
                    Some(entry) => {
                        self.ledger
                            .update_status(&entry.id, TrackStatus::Completed, patch)?;
                    }
                    None => {
                        self.ledger.insert(&LedgerEntry {
                            id: uuid::Uuid::new_v4().to_string(),
                            source_service: track.source,
                            external_id: track.external_id.clone(),
                            download_platform: acquisition.platform,
                            title: track.title.clone(),
                            artist: track.artist_label(),
                            mix_type: acquisition.mix_type,
                            genre_tags: track.genre_tags.clone(),
                            file_path: Some(acquisition.file_path),
                            status: TrackStatus::Completed,
                            downloaded_at: Some(now),
                            synced_at: None,
                            created_at: now,
                            updated_at: now,
                        })?;
                    }
                }
                Ok(TrackOutcome::Acquired)
            }
            None => {
                match &existing {
                    Some(entry) => {
                        self.ledger.update_status(
                            &entry.id,
                            TrackStatus::Failed,
                            LedgerPatch::default(),
                        )?;
                    }
                    None => {
                        self.ledger.insert(&LedgerEntry {
                            id: uuid::Uuid::new_v4().to_string(),
                            source_service: track.source,
                            external_id: track.external_id.clone(),
                            download_platform: self
                                .backends
                                .first()
                                .map(|b| b.platform())
                                .unwrap_or(crate::ledger::DownloadPlatform::Beatport),
                            title: track.title.clone(),
                            artist: track.artist_label(),
                            mix_type: None,
                            genre_tags: track.genre_tags.clone(),
                            file_path: None,
                            status: TrackStatus::Failed,
                            downloaded_at: None,
                            synced_at: None,
                            created_at: now,
                            updated_at: now,
                        })?;
                    }
                }
                Ok(TrackOutcome::Failed)
            }
        }
    }

    /// Re-examine completed tracks filed under Other. Tracks whose artists
    /// have gained genre data since are moved to their proper folder.
    async fn reclassify_inner(&self) -> Result<ReclassifyReport> {
        let other_dir = self.library_root.join(genre::OTHER);
        let mut report = ReclassifyReport::default();

        let Some(catalog) = self.configured_catalogs().next() else {
            info!("No configured catalog, skipping reclassification");
            return Ok(report);
        };

        for entry in self.ledger.all_entries()? {
            if self.cancel.is_cancelled() {
                break;
            }
            if entry.status != TrackStatus::Completed {
                continue;
            }
            let Some(file_path) = &entry.file_path else {
                continue;
            };
            if !file_path.starts_with(&other_dir) || !file_path.exists() {
                continue;
            }
            report.examined += 1;
            self.progress
                .set_current_track(Some(format!("{} - {}", entry.artist, entry.title)));

            let primary_artist = entry
                .artist
                .split(',')
                .next()
                .unwrap_or(&entry.artist)
                .trim();
            let tags = match catalog.artist_genres(primary_artist).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!("Genre lookup for '{}' failed: {:#}", primary_artist, e);
                    report.failed += 1;
                    continue;
                }
            };
            let label = genre::classify(&tags);
            if label == genre::OTHER {
                report.unchanged += 1;
                continue;
            }

            let dest_dir = self.library_root.join(label);
            match crate::acquisition::relocate(file_path, &dest_dir) {
                Ok(new_path) => {
                    info!(
                        "Reclassified '{} - {}' as {}",
                        entry.artist, entry.title, label
                    );
                    self.ledger.update_file_path(&entry.id, &new_path)?;
                    self.ledger.update_status(
                        &entry.id,
                        TrackStatus::Completed,
                        LedgerPatch {
                            genre_tags: Some(tags),
                            ..Default::default()
                        },
                    )?;
                    report.moved += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to move '{} - {}' to {}: {:#}",
                        entry.artist, entry.title, label, e
                    );
                    report.failed += 1;
                }
            }
        }
        self.progress.set_current_track(None);
        info!(
            "Reclassification: {} examined, {} moved, {} unchanged, {} failed",
            report.examined, report.moved, report.unchanged, report.failed
        );
        Ok(report)
    }
}

/// Playlist names come from user input on the streaming service and may
/// contain path separators.
fn sanitize_folder_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "Playlist".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_folder_name("Peak Time"), "Peak Time");
        assert_eq!(sanitize_folder_name("a/b:c"), "a-b-c");
        assert_eq!(sanitize_folder_name("  . "), "Playlist");
    }
}
