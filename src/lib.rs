//! Cratekeeper Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod acquisition;
pub mod catalog;
pub mod config;
pub mod genre;
pub mod ledger;
pub mod matching;
pub mod orchestrator;
pub mod progress;
pub mod server;

// Re-export commonly used types for convenience
pub use ledger::{LedgerStore, SqliteLedgerStore, TrackStatus};
pub use orchestrator::Orchestrator;
pub use progress::ProgressTracker;
