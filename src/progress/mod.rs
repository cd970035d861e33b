//! Shared progress state for long-running sync operations.
//!
//! A single tracker is shared between the orchestrator and the HTTP surface.
//! It doubles as the concurrency guard: [`ProgressTracker::try_begin`] only
//! succeeds when no operation is running.

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Which phase a running operation is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Scanning,
    Downloading,
    Reclassifying,
}

/// Snapshot of the current operation.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressState {
    pub is_running: bool,
    pub operation: Option<String>,
    pub phase: Phase,
    pub total_tracks: usize,
    pub completed_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub current_track: Option<String>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            is_running: false,
            operation: None,
            phase: Phase::Idle,
            total_tracks: 0,
            completed_count: 0,
            skipped_count: 0,
            error_count: 0,
            current_track: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct ProgressTracker {
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the tracker for an operation. Returns false when another
    /// operation is already running.
    pub fn try_begin(&self, operation: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.is_running {
            return false;
        }
        *state = ProgressState {
            is_running: true,
            operation: Some(operation.to_string()),
            phase: Phase::Scanning,
            ..Default::default()
        };
        true
    }

    pub fn set_phase(&self, phase: Phase) {
        self.state.lock().unwrap().phase = phase;
    }

    pub fn set_total(&self, total: usize) {
        self.state.lock().unwrap().total_tracks = total;
    }

    pub fn set_current_track(&self, label: Option<String>) {
        self.state.lock().unwrap().current_track = label;
    }

    pub fn track_completed(&self) {
        self.state.lock().unwrap().completed_count += 1;
    }

    pub fn track_skipped(&self) {
        self.state.lock().unwrap().skipped_count += 1;
    }

    pub fn track_failed(&self) {
        self.state.lock().unwrap().error_count += 1;
    }

    /// Release the tracker, keeping the final counters readable until the
    /// next operation begins.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.is_running = false;
        state.phase = Phase::Idle;
        state.current_track = None;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().is_running
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state.lock().unwrap().clone()
    }
}
