//! Shared progress state for a search run
//!
//! One tracker per run, shared by `Arc` between the dispatcher workers and
//! whoever observes the run. All reads and writes of the counters go through
//! a single mutex; the cancellation token lets sleeping workers wake early.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
    pub status: RunStatus,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    token: CancellationToken,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // Counters stay meaningful even if a holder panicked
    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a run over `total` records
    ///
    /// A cancel requested before the run started stays in effect.
    pub fn begin(&self, total: usize) {
        let mut state = self.lock();
        state.completed = 0;
        state.total = total;
        state.status = if state.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Running
        };
    }

    /// Add finished records; never exceeds the total
    pub fn record_completed(&self, count: usize) -> ProgressState {
        let mut state = self.lock();
        state.completed = state.completed.saturating_add(count).min(state.total);
        state.clone()
    }

    /// Ask the run to stop at its next checkpoint
    ///
    /// Returns true when a run was in progress.
    pub fn request_cancel(&self) -> bool {
        let was_running = {
            let mut state = self.lock();
            state.cancelled = true;
            let running = state.status == RunStatus::Running;
            if running {
                state.status = RunStatus::Cancelled;
            }
            running
        };
        self.token.cancel();

        if was_running {
            info!("Search run cancellation requested");
        }
        was_running
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Token that fires when a cancel is requested
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn snapshot(&self) -> ProgressState {
        self.lock().clone()
    }

    /// Mark the run resolved; Cancelled wins over Completed
    pub fn finish(&self) -> ProgressState {
        let mut state = self.lock();
        state.status = if state.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        state.clone()
    }
}
