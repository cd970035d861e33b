//! Persisted record of every acquired track, keyed by source service and
//! external track id. The orchestrator consults it before acquiring anything
//! so the same liked track is never downloaded twice.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{DownloadPlatform, LedgerEntry, LedgerPatch, LedgerStats, TrackStatus};
pub use store::SqliteLedgerStore;
pub use trait_def::LedgerStore;
