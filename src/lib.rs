//! Phenosynth render service
//!
//! A render job scheduler and adaptive audio streaming service. Clients
//! submit genome render requests over long-lived WebSocket connections;
//! the service bounds concurrent execution against a fixed worker
//! capacity, queues excess demand in arrival order, enforces per-render
//! timeouts, cancels work on client disconnect, and paces chunked audio
//! delivery against reported playback position so the server never
//! overproduces buffered audio.
//!
//! # Structure
//!
//! - [`engine`]: the seam to the external genome→audio synthesis engine
//! - [`scheduler`]: admission queue, job state machine, worker pool
//! - [`stream`]: paced chunk delivery and batch accumulation
//! - [`ws`]: wire protocol, per-connection sessions, the axum server
//! - [`health`]: REST side-channel report
//! - [`port`]: fixed or path-hash-derived listen ports, host discovery

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod port;
pub mod scheduler;
pub mod shutdown;
pub mod stream;
pub mod telemetry;
pub mod ws;

use std::sync::Arc;

use engine::genome::{DirStore, MemoryStore};
use engine::tone::ToneRenderer;
use engine::{GenomeStore, Renderer};
use health::{HealthChecker, HealthConfig};
use scheduler::{AdmissionQueue, WorkerPool};
use shutdown::ShutdownCoordinator;
use ws::connections::ConnectionLimiter;
use ws::server::ServerState;
use ws::session::{SessionConfig, SessionContext};

pub use config::EnvConfig;
pub use error::ServiceError;

/// A fully wired service instance, ready to serve.
pub struct Service {
    pub state: Arc<ServerState>,
    pub shutdown: Arc<ShutdownCoordinator>,
}

impl Service {
    /// Wire all components from configuration, using the built-in tone
    /// renderer as the synthesis engine.
    pub fn new(config: &EnvConfig) -> Self {
        Self::with_renderer(config, Arc::new(ToneRenderer))
    }

    /// Wire all components around an externally supplied renderer.
    pub fn with_renderer(config: &EnvConfig, renderer: Arc<dyn Renderer>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let token = shutdown.cancel_token();

        let store: Arc<dyn GenomeStore> = match &config.genome_dir {
            Some(dir) => Arc::new(DirStore::new(dir.clone())),
            None => Arc::new(MemoryStore::new()),
        };

        let workers =
            WorkerPool::spawn(renderer, config.effective_workers(), token.clone());
        let admission = AdmissionQueue::new(config.admission.clone());

        let sessions = Arc::new(SessionContext {
            admission,
            workers,
            store,
            config: SessionConfig {
                sample_rate: config.sample_rate,
                chunk_duration: config.chunk_duration,
                render_timeout: config.render_timeout,
                max_message_size: config.max_payload,
                pacer: config.pacer.clone(),
            },
            shutdown: token,
        });

        let state = ServerState::new(
            sessions,
            ConnectionLimiter::new(config.max_connections),
            HealthChecker::new(HealthConfig {
                degraded_queue_depth: config.admission.max_queued.max(2) / 2,
            }),
            Arc::clone(&shutdown),
            config.max_payload,
        );

        Self { state, shutdown }
    }
}
