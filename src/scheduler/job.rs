//! Per-job state machine.
//!
//! `Queued → Running → {Completed | Failed | Cancelled | TimedOut}`.
//! Completion, cancellation, and timeout race for the single terminal
//! transition; whichever lands first wins and the rest become no-ops. The
//! race is resolved with one atomic cell, not locks.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Queued | JobState::Running)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => JobState::Queued,
            1 => JobState::Running,
            2 => JobState::Completed,
            3 => JobState::Failed,
            4 => JobState::Cancelled,
            _ => JobState::TimedOut,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Running => 1,
            JobState::Completed => 2,
            JobState::Failed => 3,
            JobState::Cancelled => 4,
            JobState::TimedOut => 5,
        }
    }
}

/// Shared, lock-free view of one job's state.
#[derive(Clone)]
pub struct JobStateCell(Arc<AtomicU8>);

impl JobStateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(JobState::Queued.as_u8())))
    }

    pub fn get(&self) -> JobState {
        JobState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Queued → Running. False if the job already reached a terminal state
    /// (cancelled while waiting).
    pub fn mark_running(&self) -> bool {
        self.0
            .compare_exchange(
                JobState::Queued.as_u8(),
                JobState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// First terminal transition wins; later attempts return false.
    pub fn finish(&self, terminal: JobState) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if JobState::from_u8(current).is_terminal() {
                return false;
            }
            match self.0.compare_exchange(
                current,
                terminal.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for JobStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime record for one admitted render request.
pub struct Job {
    pub id: u64,
    /// Client-supplied correlation id, echoed in every reply.
    pub request_id: Option<String>,
    pub state: JobStateCell,
    pub cancel: CancellationToken,
    pub submitted_at: Instant,
}

impl Job {
    pub fn new(id: u64, request_id: Option<String>) -> Self {
        Self {
            id,
            request_id,
            state: JobStateCell::new(),
            cancel: CancellationToken::new(),
            submitted_at: Instant::now(),
        }
    }
}
