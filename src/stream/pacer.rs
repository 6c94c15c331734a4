//! Client-driven pacing of chunked delivery.
//!
//! The pacer throttles chunk production against the client's reported
//! playback position plus a fixed look-ahead: the renderer keeps producing
//! while `rendered − client_position < buffer_ahead` and pauses otherwise.
//! Position reports are last-write-wins; a stale report only causes
//! temporary over-buffering.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{Chunk, RenderControl, RenderError};

/// Per-connection playback/progress record for one streaming render.
///
/// Written from two sides: the session stores inbound position reports,
/// the pacer stores rendered progress. Both are plain atomic stores.
#[derive(Default)]
pub struct PlaybackState {
    position_bits: AtomicU64,
    rendered_bits: AtomicU64,
    total_samples: AtomicU64,
    total_chunks: AtomicU64,
    reported: AtomicBool,
}

impl PlaybackState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Last-write-wins update from a `playback-position` report.
    pub fn report_position(&self, seconds: f64) {
        self.position_bits
            .store(seconds.max(0.0).to_bits(), Ordering::Release);
        self.reported.store(true, Ordering::Release);
    }

    /// True once at least one position report has arrived.
    pub fn has_position_report(&self) -> bool {
        self.reported.load(Ordering::Acquire)
    }

    pub fn client_position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    pub fn rendered_duration(&self) -> f64 {
        f64::from_bits(self.rendered_bits.load(Ordering::Acquire))
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Acquire)
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks.load(Ordering::Acquire)
    }

    fn record_chunk(&self, chunk: &Chunk) {
        self.rendered_bits
            .store(chunk.timestamp.to_bits(), Ordering::Release);
        self.total_samples
            .fetch_add(chunk.samples.len() as u64, Ordering::AcqRel);
        self.total_chunks.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// How far ahead of playback to stay, in seconds.
    pub buffer_ahead: f64,
    /// Initial look-ahead rendered before any client feedback, in seconds.
    pub initial_buffer: f64,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self { buffer_ahead: 2.0, initial_buffer: 2.0 }
    }
}

/// [`RenderControl`] for paced delivery: forwards chunks over a bounded
/// channel to the owning job and applies the buffer-ahead throttle.
pub struct Pacer {
    playback: Arc<PlaybackState>,
    config: PacerConfig,
    cancel: CancellationToken,
    chunk_tx: mpsc::Sender<Chunk>,
    buffer_full_seen: AtomicBool,
}

impl Pacer {
    pub fn new(
        playback: Arc<PlaybackState>,
        config: PacerConfig,
        cancel: CancellationToken,
        chunk_tx: mpsc::Sender<Chunk>,
    ) -> Self {
        Self {
            playback,
            config,
            cancel,
            chunk_tx,
            buffer_full_seen: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RenderControl for Pacer {
    async fn on_chunk(&self, chunk: Chunk) -> Result<(), RenderError> {
        self.playback.record_chunk(&chunk);
        self.chunk_tx
            .send(chunk)
            .await
            .map_err(|_| RenderError::Disconnected)
    }

    fn should_resume(&self, rendered_duration: f64) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        // Until the client reports playback, only the initial look-ahead
        // is rendered; afterwards the steady-state window applies.
        let window = if self.playback.has_position_report() {
            self.config.buffer_ahead
        } else {
            self.config.initial_buffer
        };
        rendered_duration - self.playback.client_position() < window
    }

    fn on_buffer_full(&self, rendered_duration: f64) {
        if !self.buffer_full_seen.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                rendered_duration,
                initial_buffer = self.config.initial_buffer,
                "initial look-ahead buffer full, waiting for client playback"
            );
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
