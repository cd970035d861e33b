//! SQLite-backed ledger store implementation.

use super::models::{DownloadPlatform, LedgerEntry, LedgerPatch, LedgerStats, TrackStatus};
use super::schema::LEDGER_SCHEMA;
use super::trait_def::LedgerStore;
use crate::catalog::SourceService;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// SQLite-backed ledger.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    read_conn: Arc<Mutex<Connection>>,
    write_conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    /// Open (or create) the ledger database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open ledger database")?;

        write_conn
            .execute_batch(LEDGER_SCHEMA)
            .context("Failed to create ledger schema")?;

        write_conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on ledger write connection")?;

        let read_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open ledger database for reading")?;

        let total: usize = read_conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
        info!("Ledger ready: {} tracks on record", total);

        Ok(Self {
            read_conn: Arc::new(Mutex::new(read_conn)),
            write_conn: Arc::new(Mutex::new(write_conn)),
        })
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<LedgerEntry> {
        let service: String = row.get("source_service")?;
        let platform: String = row.get("download_platform")?;
        let status: String = row.get("status")?;
        let genre_tags: Option<String> = row.get("genre_tags")?;
        let file_path: Option<String> = row.get("file_path")?;

        Ok(LedgerEntry {
            id: row.get("id")?,
            source_service: SourceService::parse(&service).unwrap_or(SourceService::Spotify),
            external_id: row.get("external_id")?,
            download_platform: DownloadPlatform::parse(&platform)
                .unwrap_or(DownloadPlatform::Beatport),
            title: row.get("title")?,
            artist: row.get("artist")?,
            mix_type: row.get("mix_type")?,
            genre_tags: parse_json_array(genre_tags),
            file_path: file_path.map(Into::into),
            status: TrackStatus::parse(&status).unwrap_or(TrackStatus::Failed),
            downloaded_at: row.get("downloaded_at")?,
            synced_at: row.get("synced_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

// Helper: serialize genre tags to a JSON array or NULL
fn json_array_or_null(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        None
    } else {
        Some(serde_json::to_string(tags).unwrap())
    }
}

// Helper: deserialize a JSON array or NULL
fn parse_json_array(s: Option<String>) -> Vec<String> {
    s.and_then(|json| {
        serde_json::from_str(&json)
            .map_err(|e| {
                warn!("Malformed genre tags in ledger db: {}: {}", json, e);
                e
            })
            .ok()
    })
    .unwrap_or_default()
}

impl LedgerStore for SqliteLedgerStore {
    fn exists(&self, service: SourceService, external_id: &str) -> Result<bool> {
        let conn = self.read_conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE source_service = ?1 AND external_id = ?2",
            params![service.as_str(), external_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn find(&self, service: SourceService, external_id: &str) -> Result<Option<LedgerEntry>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM tracks WHERE source_service = ?1 AND external_id = ?2",
        )?;
        let entry = stmt
            .query_row(params![service.as_str(), external_id], Self::row_to_entry)
            .optional()?;
        Ok(entry)
    }

    fn insert(&self, entry: &LedgerEntry) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO tracks (
                id, source_service, external_id, download_platform, title, artist,
                mix_type, genre_tags, file_path, status, downloaded_at, synced_at,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        stmt.execute(params![
            entry.id,
            entry.source_service.as_str(),
            entry.external_id,
            entry.download_platform.as_str(),
            entry.title,
            entry.artist,
            entry.mix_type,
            json_array_or_null(&entry.genre_tags),
            entry.file_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            entry.status.as_str(),
            entry.downloaded_at,
            entry.synced_at,
            entry.created_at,
            entry.updated_at,
        ])
        .context("Failed to insert ledger entry")?;
        Ok(())
    }

    fn update_status(&self, id: &str, status: TrackStatus, patch: LedgerPatch) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();

        let current: Option<String> = conn
            .query_row("SELECT status FROM tracks WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .optional()?;
        let current = current.ok_or_else(|| anyhow!("No ledger entry with id {}", id))?;
        let current =
            TrackStatus::parse(&current).ok_or_else(|| anyhow!("Bad status in db: {}", current))?;

        if current != status && !current.can_transition_to(status) {
            bail!(
                "Illegal ledger status transition {} -> {} for entry {}",
                current.as_str(),
                status.as_str(),
                id
            );
        }

        let now = Utc::now().timestamp();
        let downloaded_at = (status == TrackStatus::Completed).then_some(now);
        let synced_at = (status == TrackStatus::Synced).then_some(now);

        let mut stmt = conn.prepare_cached(
            "UPDATE tracks SET
                status = ?2,
                updated_at = ?3,
                file_path = COALESCE(?4, file_path),
                mix_type = COALESCE(?5, mix_type),
                genre_tags = COALESCE(?6, genre_tags),
                downloaded_at = COALESCE(?7, downloaded_at),
                synced_at = COALESCE(?8, synced_at)
             WHERE id = ?1",
        )?;
        stmt.execute(params![
            id,
            status.as_str(),
            now,
            patch.file_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            patch.mix_type,
            patch.genre_tags.as_deref().and_then(json_array_or_null),
            downloaded_at,
            synced_at,
        ])?;
        Ok(())
    }

    fn update_file_path(&self, id: &str, file_path: &Path) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tracks SET file_path = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id,
                file_path.to_string_lossy().into_owned(),
                Utc::now().timestamp()
            ],
        )?;
        if changed == 0 {
            bail!("No ledger entry with id {}", id);
        }
        Ok(())
    }

    fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        let conn = self.read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT * FROM tracks ORDER BY created_at DESC")?;
        let entries = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn stats(&self) -> Result<LedgerStats> {
        let mut stats = LedgerStats::default();
        for entry in self.all_entries()? {
            stats.total += 1;
            *stats
                .by_source_service
                .entry(entry.source_service.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_download_platform
                .entry(entry.download_platform.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_status
                .entry(entry.status.as_str().to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(service: SourceService, external_id: &str, status: TrackStatus) -> LedgerEntry {
        let now = Utc::now().timestamp();
        LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            source_service: service,
            external_id: external_id.to_string(),
            download_platform: DownloadPlatform::Beatport,
            title: "One More Time".to_string(),
            artist: "Daft Punk".to_string(),
            mix_type: Some("Extended Mix".to_string()),
            genre_tags: vec!["french house".to_string()],
            file_path: None,
            status,
            downloaded_at: None,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_find_round_trip() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();

        let e = entry(SourceService::Spotify, "track-1", TrackStatus::Completed);
        store.insert(&e).unwrap();

        assert!(store.exists(SourceService::Spotify, "track-1").unwrap());
        assert!(!store.exists(SourceService::Tidal, "track-1").unwrap());

        let found = store.find(SourceService::Spotify, "track-1").unwrap().unwrap();
        assert_eq!(found.id, e.id);
        assert_eq!(found.status, TrackStatus::Completed);
        assert_eq!(found.genre_tags, vec!["french house".to_string()]);
        assert_eq!(found.mix_type.as_deref(), Some("Extended Mix"));
    }

    #[test]
    fn test_uniqueness_constraint() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();

        store
            .insert(&entry(SourceService::Spotify, "dup", TrackStatus::Completed))
            .unwrap();
        assert!(store
            .insert(&entry(SourceService::Spotify, "dup", TrackStatus::Completed))
            .is_err());
        // Same external id on another service is a different identity.
        store
            .insert(&entry(SourceService::Tidal, "dup", TrackStatus::Completed))
            .unwrap();
    }

    #[test]
    fn test_status_transition_enforcement() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();

        let e = entry(SourceService::Spotify, "t", TrackStatus::Pending);
        store.insert(&e).unwrap();

        store
            .update_status(&e.id, TrackStatus::Downloading, LedgerPatch::default())
            .unwrap();
        store
            .update_status(&e.id, TrackStatus::Completed, LedgerPatch::default())
            .unwrap();
        store
            .update_status(&e.id, TrackStatus::Synced, LedgerPatch::default())
            .unwrap();

        // Synced is terminal.
        assert!(store
            .update_status(&e.id, TrackStatus::Pending, LedgerPatch::default())
            .is_err());
    }

    #[test]
    fn test_stats_breakdown() {
        let dir = tempdir().unwrap();
        let store = SqliteLedgerStore::new(dir.path().join("ledger.db")).unwrap();

        store
            .insert(&entry(SourceService::Spotify, "a", TrackStatus::Completed))
            .unwrap();
        store
            .insert(&entry(SourceService::Spotify, "b", TrackStatus::Failed))
            .unwrap();
        store
            .insert(&entry(SourceService::Tidal, "c", TrackStatus::Completed))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_source_service["spotify"], 2);
        assert_eq!(stats.by_source_service["tidal"], 1);
        assert_eq!(stats.by_status["completed"], 2);
        assert_eq!(stats.by_status["failed"], 1);
    }
}
