//! Per-connection session: decode, dispatch, reply, clean up.
//!
//! A session owns one duplex connection. Inbound frames arrive on a
//! channel from the transport reader, outbound frames leave on a channel
//! to the transport writer; the session itself never touches the socket.
//! Protocol and render errors become `error` replies and the connection
//! stays open; only a transport failure or shutdown ends the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{pcm, Chunk, GenomeAndMeta, GenomeStore, RenderControl, RenderParams};
use crate::error::ServiceError;
use crate::scheduler::{
    Admission, AdmissionError, AdmissionQueue, Job, JobState, RenderTask, WorkerPool,
};
use crate::stream::{BatchCollector, Pacer, PacerConfig, PlaybackState};
use crate::telemetry;
use crate::ws::protocol::{self, ClientMessage, RenderRequest, ServerMessage};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Frame handed to the session by the transport reader.
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Frame handed to the transport writer by the session.
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Per-session tunables, resolved from service configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default output sample rate when the request does not override it.
    pub sample_rate: u32,
    /// Target duration of one streamed chunk, seconds.
    pub chunk_duration: f64,
    /// Wall-clock budget for one render, measured from Running.
    pub render_timeout: Duration,
    /// Upper bound on one inbound text frame.
    pub max_message_size: usize,
    pub pacer: PacerConfig,
}

/// Shared collaborators every session dispatches into.
pub struct SessionContext {
    pub admission: Arc<AdmissionQueue>,
    pub workers: Arc<WorkerPool>,
    pub store: Arc<dyn GenomeStore>,
    pub config: SessionConfig,
    /// Service-wide drain signal; sessions stop accepting work when it fires.
    pub shutdown: CancellationToken,
}

struct ActiveJob {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    /// Present only for paced renders; target of position reports.
    playback: Option<Arc<PlaybackState>>,
}

impl ActiveJob {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct Session {
    ctx: Arc<SessionContext>,
    connection_id: u64,
    active: Option<ActiveJob>,
}

impl Session {
    pub fn new(ctx: Arc<SessionContext>, connection_id: u64) -> Self {
        Self { ctx, connection_id, active: None }
    }

    /// Drive the session until the transport closes or shutdown fires.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<InboundFrame>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) {
        let welcome = ServerMessage::Welcome { sample_rate: self.ctx.config.sample_rate };
        if send_message(&outbound, &welcome).await.is_err() {
            return;
        }

        loop {
            let frame = tokio::select! {
                biased;
                () = self.ctx.shutdown.cancelled() => {
                    // Drain: no new work, but an in-flight render finishes.
                    self.drain_active(&mut inbound).await;
                    return;
                }
                frame = inbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            match frame {
                InboundFrame::Text(text) => {
                    if self.handle_text(&text, &outbound).await.is_err() {
                        break;
                    }
                }
                InboundFrame::Binary(_) => {
                    let reply =
                        ServerMessage::error(None, "binary frames are not accepted");
                    if send_message(&outbound, &reply).await.is_err() {
                        break;
                    }
                }
            }
        }

        // Transport closed: a render in flight is abandoned.
        if let Some(active) = self.active.take() {
            if active.is_running() {
                tracing::debug!(
                    connection_id = self.connection_id,
                    "connection closed with render in flight, cancelling"
                );
            }
            active.cancel.cancel();
        }
    }

    /// Wind down during shutdown: wait for the active job to settle while
    /// still relaying position reports, so a throttled render can finish
    /// and its `complete` reaches the client. New requests are ignored; a
    /// transport close during the drain cancels as usual. The wait is
    /// bounded by the job's own render timeout.
    async fn drain_active(&mut self, inbound: &mut mpsc::Receiver<InboundFrame>) {
        let Some(active) = self.active.as_mut() else { return };
        if active.handle.is_finished() {
            self.active = None;
            return;
        }
        tracing::debug!(
            connection_id = self.connection_id,
            "draining in-flight render before shutdown"
        );

        let ActiveJob { handle, cancel, playback } = active;
        loop {
            tokio::select! {
                biased;
                _ = &mut *handle => break,
                frame = inbound.recv() => match frame {
                    Some(InboundFrame::Text(text)) => {
                        if let Ok(ClientMessage::PlaybackPosition { position }) =
                            protocol::decode_message(&text, self.ctx.config.max_message_size)
                        {
                            if let Some(playback) = playback {
                                playback.report_position(position);
                            }
                        }
                    }
                    Some(InboundFrame::Binary(_)) => {}
                    None => {
                        cancel.cancel();
                        break;
                    }
                },
            }
        }
        self.active = None;
    }

    /// Returns `Err(())` only when the outbound channel is gone.
    async fn handle_text(
        &mut self,
        text: &str,
        outbound: &mpsc::Sender<OutboundFrame>,
    ) -> Result<(), ()> {
        let message = match protocol::decode_message(text, self.ctx.config.max_message_size) {
            Ok(message) => message,
            Err(e) => {
                let request_id = extract_request_id(text);
                tracing::debug!(
                    connection_id = self.connection_id,
                    error = %e,
                    "rejected inbound frame"
                );
                return send_message(outbound, &ServerMessage::error(request_id, e.to_string()))
                    .await;
            }
        };

        match message {
            ClientMessage::Render(request) => self.handle_render(request, outbound).await,
            ClientMessage::PlaybackPosition { position } => {
                // Only meaningful while a paced render is active; a report
                // with no active job is discarded without comment.
                if let Some(active) = &self.active {
                    if let Some(playback) = &active.playback {
                        playback.report_position(position);
                    }
                }
                Ok(())
            }
        }
    }

    async fn handle_render(
        &mut self,
        request: RenderRequest,
        outbound: &mpsc::Sender<OutboundFrame>,
    ) -> Result<(), ()> {
        let request_id = request.request_id.clone();

        if let Some(active) = &self.active {
            if active.is_running() {
                let reply = ServerMessage::error(
                    request_id,
                    "a render is already in progress on this connection",
                );
                return send_message(outbound, &reply).await;
            }
        }

        if let Err(e) = request.validate() {
            let reply = ServerMessage::error(
                request_id,
                ServiceError::InvalidRequest(e.to_string()).to_string(),
            );
            return send_message(outbound, &reply).await;
        }

        // Resolve the genome before admission so a bad reference never
        // occupies a slot.
        let genome = match self.resolve_genome(&request).await {
            Ok(genome) => genome,
            Err(e) => {
                return send_message(outbound, &ServerMessage::error(request_id, e.to_string()))
                    .await;
            }
        };

        let sample_rate = request.sample_rate.unwrap_or(self.ctx.config.sample_rate);
        let params = RenderParams {
            duration: request.duration,
            note_delta: request.note_delta,
            velocity: request.velocity,
            use_gpu: request.use_gpu,
            sample_rate,
            chunk_duration: self.ctx.config.chunk_duration,
        };

        let job = Job::new(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed), request_id);
        let cancel = job.cancel.clone();
        let playback = if request.batch { None } else { Some(PlaybackState::new()) };

        tracing::info!(
            connection_id = self.connection_id,
            job_id = job.id,
            request_id = job.request_id.as_deref().unwrap_or(""),
            duration = request.duration,
            batch = request.batch,
            sample_rate,
            "render request accepted"
        );

        let handle = tokio::spawn(run_job(
            Arc::clone(&self.ctx),
            job,
            Arc::new(genome),
            params,
            playback.clone(),
            outbound.clone(),
        ));

        self.active = Some(ActiveJob { handle, cancel, playback });
        Ok(())
    }

    async fn resolve_genome(
        &self,
        request: &RenderRequest,
    ) -> Result<GenomeAndMeta, ServiceError> {
        let genome = match (&request.genome_id, &request.genome) {
            (Some(id), None) => self.ctx.store.load(id).await?,
            (None, Some(inline)) => inline.clone(),
            // validate() already excluded the other combinations.
            _ => return Err(ServiceError::InvalidRequest("no genome supplied".into())),
        };
        Ok(GenomeAndMeta {
            genome,
            duration: request.duration,
            note_delta: request.note_delta,
            velocity: request.velocity,
            reverse: false,
        })
    }
}

/// Execute one admitted render to a terminal state and emit its replies.
///
/// Holds the slot permit from admission until the job reaches a terminal
/// state; a stuck render is aborted by the timeout rather than holding the
/// slot hostage.
async fn run_job(
    ctx: Arc<SessionContext>,
    job: Job,
    genome: Arc<GenomeAndMeta>,
    params: RenderParams,
    playback: Option<Arc<PlaybackState>>,
    outbound: mpsc::Sender<OutboundFrame>,
) {
    let permit = match ctx.admission.submit(job.cancel.clone()) {
        Ok(Admission::Admitted(permit)) => permit,
        Ok(Admission::Queued(ticket)) => {
            tracing::debug!(job_id = job.id, position = ticket.position, "render queued");
            match ticket.wait(&job.cancel).await {
                Some(permit) => permit,
                None => {
                    // Cancelled while waiting; the job never ran and the
                    // client is gone, so nothing is sent.
                    job.state.finish(JobState::Cancelled);
                    telemetry::count_job_cancelled();
                    return;
                }
            }
        }
        Err(AdmissionError::QueueFull(waiting)) => {
            job.state.finish(JobState::Failed);
            telemetry::count_job_refused();
            tracing::warn!(job_id = job.id, waiting, "render refused, queue full");
            let reply =
                ServerMessage::error(job.request_id.clone(), ServiceError::QueueFull.to_string());
            let _ = send_message(&outbound, &reply).await;
            return;
        }
    };

    if !job.state.mark_running() {
        telemetry::count_job_cancelled();
        return;
    }
    tracing::debug!(
        job_id = job.id,
        queued_for_ms = job.submitted_at.elapsed().as_millis() as u64,
        "render running"
    );

    let outcome = match &playback {
        Some(playback) => {
            run_paced(&ctx, &job, genome, params, Arc::clone(playback), &outbound).await
        }
        None => run_batch(&ctx, &job, genome, params, &outbound).await,
    };

    // Terminal transition releases the slot; the permit drops here even if
    // an aborted render task is still unwinding.
    drop(permit);

    match outcome {
        Ok(()) => {
            if job.state.finish(JobState::Completed) {
                telemetry::count_job_completed();
                tracing::info!(job_id = job.id, "render completed");
            }
        }
        Err(error) => report_failure(&job, error, &outbound).await,
    }
}

/// Map a failed outcome to its terminal state and wire reply. `Cancelled`
/// is deliberately silent: the client is gone or asked for it.
async fn report_failure(job: &Job, error: ServiceError, outbound: &mpsc::Sender<OutboundFrame>) {
    let (terminal, reply) = match &error {
        ServiceError::Cancelled => (JobState::Cancelled, None),
        ServiceError::Timeout(_) => (JobState::TimedOut, Some(error.to_string())),
        _ => (JobState::Failed, Some(error.to_string())),
    };
    if !job.state.finish(terminal) {
        // Another path (disconnect, shutdown) already settled the job.
        return;
    }
    match terminal {
        JobState::Cancelled => telemetry::count_job_cancelled(),
        JobState::TimedOut => telemetry::count_job_timed_out(),
        _ => telemetry::count_job_failed(),
    }
    tracing::warn!(job_id = job.id, error = %error, "render did not complete");
    if let Some(message) = reply {
        let _ = send_message(outbound, &ServerMessage::error(job.request_id.clone(), message))
            .await;
    }
}

/// Paced delivery: forward chunks as they clear the pacer, finish with a
/// `complete` summary. Chunk order is the channel order, which is the
/// production order.
async fn run_paced(
    ctx: &SessionContext,
    job: &Job,
    genome: Arc<GenomeAndMeta>,
    params: RenderParams,
    playback: Arc<PlaybackState>,
    outbound: &mpsc::Sender<OutboundFrame>,
) -> Result<(), ServiceError> {
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Chunk>(8);
    let pacer = Arc::new(Pacer::new(
        Arc::clone(&playback),
        ctx.config.pacer.clone(),
        job.cancel.clone(),
        chunk_tx,
    ));
    let (reply_tx, reply_rx) = oneshot::channel();

    ctx.workers
        .submit(RenderTask {
            genome,
            params: params.clone(),
            control: pacer,
            abort: job.cancel.clone(),
            reply: reply_tx,
        })
        .await
        .map_err(|e| ServiceError::RenderFailure(e.to_string()))?;

    let deadline = tokio::time::sleep(ctx.config.render_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            () = job.cancel.cancelled() => {
                return Err(ServiceError::Cancelled);
            }
            () = &mut deadline => {
                job.cancel.cancel();
                return Err(ServiceError::Timeout(ctx.config.render_timeout.as_secs()));
            }
            chunk = chunk_rx.recv() => match chunk {
                Some(chunk) => {
                    let message = ServerMessage::Chunk {
                        request_id: job.request_id.clone(),
                        index: chunk.index,
                        data: chunk.samples,
                        timestamp: chunk.timestamp,
                        sample_rate: chunk.sample_rate,
                    };
                    send_message(outbound, &message)
                        .await
                        .map_err(|()| ServiceError::Cancelled)?;
                    telemetry::count_chunk_sent();
                }
                // Sender dropped: the render returned and the channel is
                // drained, so every chunk went out before `complete`.
                None => break,
            },
        }
    }

    match reply_rx.await {
        Ok(Ok(())) => {
            let total_samples = playback.total_samples();
            let message = ServerMessage::Complete {
                request_id: job.request_id.clone(),
                total_chunks: playback.total_chunks(),
                total_samples,
                duration: total_samples as f64 / params.sample_rate as f64,
                sample_rate: params.sample_rate,
            };
            send_message(outbound, &message).await.map_err(|()| ServiceError::Cancelled)
        }
        Ok(Err(render_error)) => Err(render_error.into()),
        Err(_) => Err(ServiceError::RenderFailure("worker dropped the render".into())),
    }
}

/// Batch delivery: accumulate everything, then `batch-result` + one binary
/// frame + `complete`.
async fn run_batch(
    ctx: &SessionContext,
    job: &Job,
    genome: Arc<GenomeAndMeta>,
    params: RenderParams,
    outbound: &mpsc::Sender<OutboundFrame>,
) -> Result<(), ServiceError> {
    let collector = Arc::new(BatchCollector::new(job.cancel.clone(), params.sample_rate));
    let control: Arc<dyn RenderControl> = collector.clone();
    let (reply_tx, reply_rx) = oneshot::channel();

    ctx.workers
        .submit(RenderTask {
            genome,
            params,
            control,
            abort: job.cancel.clone(),
            reply: reply_tx,
        })
        .await
        .map_err(|e| ServiceError::RenderFailure(e.to_string()))?;

    let deadline = tokio::time::sleep(ctx.config.render_timeout);
    tokio::pin!(deadline);

    let result = tokio::select! {
        biased;
        () = job.cancel.cancelled() => return Err(ServiceError::Cancelled),
        () = &mut deadline => {
            job.cancel.cancel();
            return Err(ServiceError::Timeout(ctx.config.render_timeout.as_secs()));
        }
        reply = reply_rx => reply,
    };

    match result {
        Ok(Ok(())) => {
            let output = collector.finish();
            let announce = ServerMessage::BatchResult {
                request_id: job.request_id.clone(),
                total_samples: output.total_samples as u64,
                duration: output.duration,
                sample_rate: output.sample_rate,
            };
            send_message(outbound, &announce).await.map_err(|()| ServiceError::Cancelled)?;
            outbound
                .send(OutboundFrame::Binary(pcm::to_le_bytes(&output.samples)))
                .await
                .map_err(|_| ServiceError::Cancelled)?;
            let complete = ServerMessage::Complete {
                request_id: job.request_id.clone(),
                total_chunks: output.total_chunks,
                total_samples: output.total_samples as u64,
                duration: output.duration,
                sample_rate: output.sample_rate,
            };
            send_message(outbound, &complete).await.map_err(|()| ServiceError::Cancelled)
        }
        Ok(Err(render_error)) => Err(render_error.into()),
        Err(_) => Err(ServiceError::RenderFailure("worker dropped the render".into())),
    }
}

async fn send_message(
    outbound: &mpsc::Sender<OutboundFrame>,
    message: &ServerMessage,
) -> Result<(), ()> {
    let text = match protocol::encode_message(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode outbound message");
            return Ok(());
        }
    };
    outbound.send(OutboundFrame::Text(text)).await.map_err(|_| ())
}

/// Best-effort requestId recovery from a frame that failed to decode, so
/// the error reply still correlates.
fn extract_request_id(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("requestId")?
        .as_str()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tone::ToneRenderer;
    use crate::engine::GenomeStoreError;
    use crate::scheduler::AdmissionConfig;
    use async_trait::async_trait;

    struct FixedStore;

    #[async_trait]
    impl GenomeStore for FixedStore {
        async fn load(&self, id: &str) -> Result<serde_json::Value, GenomeStoreError> {
            if id == "known" {
                Ok(serde_json::json!({"nodes": [1, 2, 3]}))
            } else {
                Err(GenomeStoreError::NotFound(id.to_string()))
            }
        }
    }

    fn context() -> Arc<SessionContext> {
        let shutdown = CancellationToken::new();
        Arc::new(SessionContext {
            admission: AdmissionQueue::new(AdmissionConfig::default()),
            workers: WorkerPool::spawn(Arc::new(ToneRenderer), 2, shutdown.clone()),
            store: Arc::new(FixedStore),
            config: SessionConfig {
                sample_rate: 8_000,
                chunk_duration: 0.05,
                render_timeout: Duration::from_secs(5),
                max_message_size: 64 * 1024,
                pacer: PacerConfig { buffer_ahead: 100.0, initial_buffer: 100.0 },
            },
            shutdown,
        })
    }

    async fn collect_frames(
        mut rx: mpsc::Receiver<OutboundFrame>,
    ) -> (Vec<serde_json::Value>, Vec<Vec<u8>>) {
        let mut texts = Vec::new();
        let mut binaries = Vec::new();
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Text(t) => texts.push(serde_json::from_str(&t).unwrap()),
                OutboundFrame::Binary(b) => binaries.push(b),
            }
        }
        (texts, binaries)
    }

    #[tokio::test]
    async fn welcome_then_paced_chunks_then_complete() {
        let ctx = context();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(64);
        let session = Session::new(ctx, 1);

        let driver = tokio::spawn(session.run(in_rx, out_tx));
        in_tx
            .send(InboundFrame::Text(
                r#"{"type":"render","requestId":"r-1","genomeId":"known","duration":0.2}"#
                    .into(),
            ))
            .await
            .unwrap();

        // Let the render complete, then close the connection.
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(in_tx);
        driver.await.unwrap();

        let (texts, binaries) = collect_frames(out_rx).await;
        assert!(binaries.is_empty());
        assert_eq!(texts[0]["type"], "welcome");
        assert_eq!(texts[0]["sampleRate"], 8_000);

        let chunks: Vec<_> = texts.iter().filter(|m| m["type"] == "chunk").collect();
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk["index"].as_u64().unwrap(), i as u64 + 1);
            assert_eq!(chunk["requestId"], "r-1");
        }

        let complete = texts.last().unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["totalChunks"].as_u64().unwrap(), chunks.len() as u64);
        let summed: u64 = chunks
            .iter()
            .map(|c| c["data"].as_array().unwrap().len() as u64)
            .sum();
        assert_eq!(complete["totalSamples"].as_u64().unwrap(), summed);
    }

    #[tokio::test]
    async fn batch_render_emits_result_binary_complete() {
        let ctx = context();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(64);
        let session = Session::new(ctx, 2);

        let driver = tokio::spawn(session.run(in_rx, out_tx));
        in_tx
            .send(InboundFrame::Text(
                r#"{"type":"render","requestId":"b-1","genomeId":"known","duration":0.1,"batch":true}"#
                    .into(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(in_tx);
        driver.await.unwrap();

        let (texts, binaries) = collect_frames(out_rx).await;
        let batch_result = texts.iter().find(|m| m["type"] == "batch-result").unwrap();
        let complete = texts.iter().find(|m| m["type"] == "complete").unwrap();
        assert_eq!(binaries.len(), 1);
        let total_samples = batch_result["totalSamples"].as_u64().unwrap();
        assert_eq!(binaries[0].len() as u64, total_samples * 4);
        assert_eq!(complete["totalSamples"].as_u64().unwrap(), total_samples);
        assert!(texts.iter().all(|m| m["type"] != "chunk"));
    }

    #[tokio::test]
    async fn unknown_genome_is_refused_before_admission() {
        let ctx = context();
        let admission = Arc::clone(&ctx.admission);
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(64);
        let session = Session::new(ctx, 3);

        let driver = tokio::spawn(session.run(in_rx, out_tx));
        in_tx
            .send(InboundFrame::Text(
                r#"{"type":"render","requestId":"r-x","genomeId":"missing","duration":1.0}"#
                    .into(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(admission.active(), 0);
        drop(in_tx);
        driver.await.unwrap();

        let (texts, _) = collect_frames(out_rx).await;
        let error = texts.iter().find(|m| m["type"] == "error").unwrap();
        assert_eq!(error["requestId"], "r-x");
        assert!(error["message"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn unknown_message_type_keeps_the_connection_open() {
        let ctx = context();
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(64);
        let session = Session::new(ctx, 4);

        let driver = tokio::spawn(session.run(in_rx, out_tx));
        in_tx
            .send(InboundFrame::Text(r#"{"type":"bogus"}"#.into()))
            .await
            .unwrap();
        in_tx
            .send(InboundFrame::Text(
                r#"{"type":"render","requestId":"after","genomeId":"known","duration":0.05}"#
                    .into(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(in_tx);
        driver.await.unwrap();

        let (texts, _) = collect_frames(out_rx).await;
        assert!(texts.iter().any(|m| m["type"] == "error"
            && m["message"].as_str().unwrap().contains("bogus")));
        assert!(texts
            .iter()
            .any(|m| m["type"] == "complete" && m["requestId"] == "after"));
    }

    #[tokio::test]
    async fn second_render_while_one_is_running_is_refused() {
        // A tight pacing window keeps the first render throttled (no
        // position reports arrive), so it is still in flight when the
        // second request lands.
        let base = context();
        let ctx = Arc::new(SessionContext {
            admission: Arc::clone(&base.admission),
            workers: Arc::clone(&base.workers),
            store: Arc::new(FixedStore),
            config: SessionConfig {
                pacer: PacerConfig { buffer_ahead: 0.1, initial_buffer: 0.1 },
                ..base.config.clone()
            },
            shutdown: base.shutdown.clone(),
        });
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(64);
        let session = Session::new(ctx, 5);

        let driver = tokio::spawn(session.run(in_rx, out_tx));
        in_tx
            .send(InboundFrame::Text(
                r#"{"type":"render","requestId":"one","genomeId":"known","duration":1.0}"#
                    .into(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        in_tx
            .send(InboundFrame::Text(
                r#"{"type":"render","requestId":"two","genomeId":"known","duration":1.0}"#
                    .into(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(in_tx);
        driver.await.unwrap();

        let (texts, _) = collect_frames(out_rx).await;
        let error = texts.iter().find(|m| m["type"] == "error").unwrap();
        assert_eq!(error["requestId"], "two");
        assert!(error["message"].as_str().unwrap().contains("in progress"));
    }
}
