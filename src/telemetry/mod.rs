//! Telemetry: structured logging and metrics for the render service.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    count_chunk_sent, count_job_cancelled, count_job_completed, count_job_failed,
    count_job_refused, count_job_timed_out, gauge_connections, gauge_jobs_active,
    gauge_queue_depth, gauge_workers_busy,
};
