//! Service configuration loading from environment variables.
//!
//! All configuration values are loaded from `PHENO_RENDER_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PHENO_RENDER_HOST` | 0.0.0.0 | Listen address |
//! | `PHENO_RENDER_PORT` | 3000 | Listen port |
//! | `PHENO_RENDER_HOST_INFO_FILE` | (unset) | Derive port from this path and write `host:port` back |
//! | `PHENO_RENDER_WORKERS` | 0 | Render workers (0 = CPU count) |
//! | `PHENO_RENDER_MAX_CONCURRENT` | 0 | Concurrent render slots (0 = worker count) |
//! | `PHENO_RENDER_MAX_QUEUE_DEPTH` | 256 | Max queued render jobs |
//! | `PHENO_RENDER_TIMEOUT_SECS` | 180 | Per-render wall-clock budget (secs) |
//! | `PHENO_RENDER_MAX_PAYLOAD` | 52428800 | Max WebSocket frame size (bytes) |
//! | `PHENO_RENDER_MAX_CONNECTIONS` | 100 | Max open WebSocket connections |
//! | `PHENO_RENDER_SAMPLE_RATE` | 48000 | Default output sample rate (Hz) |
//! | `PHENO_RENDER_CHUNK_DURATION` | 0.25 | Target streamed chunk length (secs) |
//! | `PHENO_RENDER_BUFFER_AHEAD` | 2.0 | Pacing look-ahead window (secs) |
//! | `PHENO_RENDER_INITIAL_BUFFER` | 2.0 | Look-ahead before first position report (secs) |
//! | `PHENO_RENDER_GENOME_DIR` | (unset) | Directory backing the genome store |
//! | `PHENO_RENDER_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown drain budget (secs) |
//! | `PHENO_RENDER_LOG_FORMAT` | json | Log output format (`json` or `pretty`) |
//! | `PHENO_RENDER_LOG_LEVEL` | info | Tracing filter directive |

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::scheduler::AdmissionConfig;
use crate::stream::PacerConfig;
use crate::telemetry::LogFormat;

/// Effective service configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub host: String,
    pub port: u16,
    pub host_info_file: Option<PathBuf>,
    pub workers: usize,
    pub max_concurrent: usize,
    pub max_queue_depth: usize,
    pub render_timeout_secs: u64,
    pub max_payload: usize,
    pub max_connections: usize,
    pub sample_rate: u32,
    pub chunk_duration: f64,
    pub buffer_ahead: f64,
    pub initial_buffer: f64,
    pub genome_dir: Option<PathBuf>,
    pub shutdown_timeout_secs: u64,
}

/// Network listener configuration.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
    /// When set, the port is derived from this path and the resulting
    /// `host:port` written back for peer discovery.
    pub host_info_file: Option<PathBuf>,
}

/// All service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub listen: ListenConfig,
    /// Render worker count; 0 means one per CPU core.
    pub workers: usize,
    pub admission: AdmissionConfig,
    pub render_timeout: Duration,
    pub max_payload: usize,
    pub max_connections: usize,
    pub sample_rate: u32,
    pub chunk_duration: f64,
    pub pacer: PacerConfig,
    pub genome_dir: Option<PathBuf>,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl EnvConfig {
    /// Worker count with the CPU-count default applied.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            host: self.listen.host.clone(),
            port: self.listen.port,
            host_info_file: self.listen.host_info_file.clone(),
            workers: self.effective_workers(),
            max_concurrent: self.admission.max_concurrent,
            max_queue_depth: self.admission.max_queued,
            render_timeout_secs: self.render_timeout.as_secs(),
            max_payload: self.max_payload,
            max_connections: self.max_connections,
            sample_rate: self.sample_rate,
            chunk_duration: self.chunk_duration,
            buffer_ahead: self.pacer.buffer_ahead,
            initial_buffer: self.pacer.initial_buffer,
            genome_dir: self.genome_dir.clone(),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse an `f64` env var, returning `default` on missing, invalid, or
/// non-finite values.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => match val.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => default,
        },
        Err(_) => default,
    }
}

fn parse_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Load admission configuration from environment.
///
/// `max_concurrent` of 0 means "match the worker count", resolved by the
/// caller once the worker count is known.
fn load_admission_config(workers: usize) -> AdmissionConfig {
    let max_concurrent = parse_usize("PHENO_RENDER_MAX_CONCURRENT", 0);
    let max_concurrent = if max_concurrent == 0 { workers } else { max_concurrent };
    let max_queued = parse_usize("PHENO_RENDER_MAX_QUEUE_DEPTH", 256).max(1);
    AdmissionConfig { max_concurrent: max_concurrent.max(1), max_queued }
}

/// Load pacing configuration from environment.
fn load_pacer_config() -> PacerConfig {
    let buffer_ahead = parse_f64("PHENO_RENDER_BUFFER_AHEAD", 2.0).max(0.1);
    let initial_buffer = parse_f64("PHENO_RENDER_INITIAL_BUFFER", buffer_ahead).max(0.1);
    PacerConfig { buffer_ahead, initial_buffer }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let workers = parse_usize("PHENO_RENDER_WORKERS", 0);
    let effective_workers = if workers == 0 { num_cpus::get() } else { workers };

    const DEFAULT_PAYLOAD: usize = 50 * 1024 * 1024; // 50 MiB
    const MIN_PAYLOAD: usize = 4096; // floor: 4 KiB
    let max_payload = parse_usize("PHENO_RENDER_MAX_PAYLOAD", DEFAULT_PAYLOAD).max(MIN_PAYLOAD);

    let sample_rate = parse_u32("PHENO_RENDER_SAMPLE_RATE", 48_000).clamp(8_000, 192_000);
    let chunk_duration = parse_f64("PHENO_RENDER_CHUNK_DURATION", 0.25).clamp(0.01, 5.0);

    EnvConfig {
        listen: ListenConfig {
            host: std::env::var("PHENO_RENDER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_usize("PHENO_RENDER_PORT", 3000).min(u16::MAX as usize) as u16,
            host_info_file: parse_path("PHENO_RENDER_HOST_INFO_FILE"),
        },
        workers,
        admission: load_admission_config(effective_workers),
        render_timeout: Duration::from_secs(
            parse_u64("PHENO_RENDER_TIMEOUT_SECS", 180).max(1),
        ),
        max_payload,
        max_connections: parse_usize("PHENO_RENDER_MAX_CONNECTIONS", 100).max(1),
        sample_rate,
        chunk_duration,
        pacer: load_pacer_config(),
        genome_dir: parse_path("PHENO_RENDER_GENOME_DIR"),
        shutdown_timeout: Duration::from_secs(
            parse_u64("PHENO_RENDER_SHUTDOWN_TIMEOUT", 30).max(1),
        ),
        log_format: std::env::var("PHENO_RENDER_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        log_level: std::env::var("PHENO_RENDER_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string()),
    }
}
