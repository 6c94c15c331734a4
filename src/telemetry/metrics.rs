//! Metric recording helpers.
//!
//! Thin wrappers over the `metrics` facade so call sites stay one-liners
//! and metric names live in a single place. With no recorder installed
//! (tests, embedded use) every call is a no-op.

use metrics::{counter, gauge};

/// Jobs currently holding a worker slot.
pub fn gauge_jobs_active(active: usize) {
    gauge!("render_jobs_active").set(active as f64);
}

/// Jobs waiting in the admission queue.
pub fn gauge_queue_depth(depth: usize) {
    gauge!("render_queue_depth").set(depth as f64);
}

/// Workers currently executing a render.
pub fn gauge_workers_busy(busy: usize) {
    gauge!("render_workers_busy").set(busy as f64);
}

/// Open WebSocket connections.
pub fn gauge_connections(open: usize) {
    gauge!("ws_connections_open").set(open as f64);
}

pub fn count_job_completed() {
    counter!("render_jobs_completed").increment(1);
}

pub fn count_job_failed() {
    counter!("render_jobs_failed").increment(1);
}

pub fn count_job_cancelled() {
    counter!("render_jobs_cancelled").increment(1);
}

pub fn count_job_timed_out() {
    counter!("render_jobs_timed_out").increment(1);
}

pub fn count_job_refused() {
    counter!("render_jobs_refused").increment(1);
}

pub fn count_chunk_sent() {
    counter!("render_chunks_sent").increment(1);
}
