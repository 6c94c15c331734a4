//! HTTP surface: WebSocket upgrade endpoint plus the health side-channel.
//!
//! The socket itself is handled by a reader task and a writer task bridging
//! frames to the [`Session`](crate::ws::session::Session) over channels, so
//! session logic never blocks on the transport and a slow client cannot
//! stall decode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::health::{HealthChecker, LoadSnapshot};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry;
use crate::ws::connections::ConnectionLimiter;
use crate::ws::session::{InboundFrame, OutboundFrame, Session, SessionContext};

/// Everything a request handler can reach.
pub struct ServerState {
    pub sessions: Arc<SessionContext>,
    pub limiter: Arc<ConnectionLimiter>,
    pub health: HealthChecker,
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Upper bound on one WebSocket frame, bytes.
    pub max_payload: usize,
    connection_seq: AtomicU64,
}

impl ServerState {
    pub fn new(
        sessions: Arc<SessionContext>,
        limiter: Arc<ConnectionLimiter>,
        health: HealthChecker,
        shutdown: Arc<ShutdownCoordinator>,
        max_payload: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            limiter,
            health,
            shutdown,
            max_payload,
            connection_seq: AtomicU64::new(1),
        })
    }
}

pub fn app_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", any(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve until the shutdown token fires, then stop accepting.
pub async fn run_server(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let router = app_router(state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    let Some(track) = state.shutdown.track() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    };
    let Some(guard) = state.limiter.try_acquire() else {
        tracing::warn!(
            max_connections = state.limiter.max_connections(),
            "connection refused, at capacity"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let connection_id = state.connection_seq.fetch_add(1, Ordering::Relaxed);
    let max_payload = state.max_payload;
    let sessions = Arc::clone(&state.sessions);
    let limiter = Arc::clone(&state.limiter);

    ws.max_message_size(max_payload).on_upgrade(move |socket| async move {
        telemetry::gauge_connections(limiter.active_count());
        tracing::info!(connection_id, "connection open");

        handle_socket(socket, sessions, connection_id).await;

        drop(guard);
        drop(track);
        telemetry::gauge_connections(limiter.active_count());
        tracing::info!(connection_id, "connection closed");
    })
}

async fn handle_socket(socket: WebSocket, sessions: Arc<SessionContext>, connection_id: u64) {
    let (mut sink, mut stream) = socket.split();
    let (in_tx, in_rx) = mpsc::channel::<InboundFrame>(32);
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(64);

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let message = match frame {
                OutboundFrame::Text(text) => Message::Text(text.into()),
                OutboundFrame::Binary(bytes) => Message::Binary(bytes.into()),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(connection_id, error = %e, "transport error");
                    break;
                }
            };
            let frame = match message {
                Message::Text(text) => InboundFrame::Text(text.to_string()),
                Message::Binary(bytes) => InboundFrame::Binary(bytes.to_vec()),
                Message::Close(_) => break,
                // axum answers Ping frames itself.
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if in_tx.send(frame).await.is_err() {
                break;
            }
        }
        // Dropping in_tx closes the session's inbound channel.
    });

    Session::new(sessions, connection_id).run(in_rx, out_tx).await;

    reader.abort();
    let _ = writer.await;
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Response {
    let load = LoadSnapshot {
        workers: state.sessions.workers.occupancy(),
        jobs_active: state.sessions.admission.active(),
        queue_depth: state.sessions.admission.queued(),
        connections_open: state.limiter.active_count(),
    };
    let report = state.health.report(state.shutdown.state().await, load);
    let status = if report.accepting_connections {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tone::ToneRenderer;
    use crate::engine::GenomeStore;
    use crate::health::HealthConfig;
    use crate::scheduler::{AdmissionConfig, AdmissionQueue, WorkerPool};
    use crate::stream::PacerConfig;
    use crate::ws::session::SessionConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct EmptyStore;

    #[async_trait::async_trait]
    impl GenomeStore for EmptyStore {
        async fn load(
            &self,
            id: &str,
        ) -> Result<serde_json::Value, crate::engine::GenomeStoreError> {
            Err(crate::engine::GenomeStoreError::NotFound(id.to_string()))
        }
    }

    fn state() -> Arc<ServerState> {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let token = shutdown.cancel_token();
        let sessions = Arc::new(SessionContext {
            admission: AdmissionQueue::new(AdmissionConfig::default()),
            workers: WorkerPool::spawn(Arc::new(ToneRenderer), 2, token.clone()),
            store: Arc::new(EmptyStore),
            config: SessionConfig {
                sample_rate: 48_000,
                chunk_duration: 0.25,
                render_timeout: Duration::from_secs(5),
                max_message_size: 1024,
                pacer: PacerConfig::default(),
            },
            shutdown: token,
        });
        ServerState::new(
            sessions,
            ConnectionLimiter::new(4),
            HealthChecker::new(HealthConfig::default()),
            shutdown,
            1024 * 1024,
        )
    }

    #[tokio::test]
    async fn health_reports_ok_while_running() {
        let router = app_router(state());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let report: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report["state"], "healthy");
        assert_eq!(report["workersTotal"], 2);
        assert_eq!(report["connectionsOpen"], 0);
    }

    #[tokio::test]
    async fn health_is_unavailable_while_draining() {
        let state = state();
        let shutdown = Arc::clone(&state.shutdown);
        let router = app_router(state);
        shutdown.initiate(Duration::from_millis(10)).await;
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

}
