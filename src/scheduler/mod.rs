//! Render job scheduling.
//!
//! Admission against a fixed slot count, FIFO queueing of excess demand,
//! per-job state tracking, and the worker pool that executes renders.

pub mod job;
pub mod queue;
pub mod workers;

pub use job::{Job, JobState, JobStateCell};
pub use queue::{Admission, AdmissionConfig, AdmissionError, AdmissionQueue, QueueTicket, SlotPermit};
pub use workers::{RenderTask, WorkerOccupancy, WorkerPool, WorkerPoolError};
