//! LedgerStore trait definition.

use super::models::{LedgerEntry, LedgerPatch, LedgerStats, TrackStatus};
use crate::catalog::SourceService;
use anyhow::Result;
use std::path::Path;

/// Trait for ledger storage backends.
pub trait LedgerStore: Send + Sync {
    /// Whether a ledger entry exists for (service, external id).
    fn exists(&self, service: SourceService, external_id: &str) -> Result<bool>;

    /// Fetch the entry for (service, external id), if any.
    fn find(&self, service: SourceService, external_id: &str) -> Result<Option<LedgerEntry>>;

    /// Insert a new entry. Fails on the (service, external id) uniqueness
    /// constraint if an entry already exists.
    fn insert(&self, entry: &LedgerEntry) -> Result<()>;

    /// Update an entry's status, applying the patch fields alongside.
    /// Rejects illegal status transitions.
    fn update_status(&self, id: &str, status: TrackStatus, patch: LedgerPatch) -> Result<()>;

    /// Update only the file path (used after reclassification moves a file).
    fn update_file_path(&self, id: &str, file_path: &Path) -> Result<()>;

    /// All entries, most recent first.
    fn all_entries(&self) -> Result<Vec<LedgerEntry>>;

    /// Aggregate counts by service, platform and status.
    fn stats(&self) -> Result<LedgerStats>;
}
