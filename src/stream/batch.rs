//! Batch accumulation of a full render.
//!
//! Batch mode skips pacing entirely: chunks are accumulated into one
//! buffer, peak-normalized, and shipped as a single binary payload.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::engine::pcm;
use crate::engine::{Chunk, RenderControl, RenderError};

/// The fully rendered, normalized signal.
pub struct BatchOutput {
    pub samples: Vec<f32>,
    pub total_samples: usize,
    pub total_chunks: u64,
    pub duration: f64,
    pub sample_rate: u32,
}

/// [`RenderControl`] that accumulates every chunk and never throttles.
pub struct BatchCollector {
    samples: Mutex<Vec<f32>>,
    chunks: AtomicU64,
    cancel: CancellationToken,
    sample_rate: u32,
}

impl BatchCollector {
    pub fn new(cancel: CancellationToken, sample_rate: u32) -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
            chunks: AtomicU64::new(0),
            cancel,
            sample_rate,
        }
    }

    /// Consume the accumulated signal, normalizing peaks to full scale.
    pub fn finish(&self) -> BatchOutput {
        let mut samples = std::mem::take(&mut *self.samples.lock());
        pcm::peak_normalize(&mut samples);
        let total_samples = samples.len();
        let duration = total_samples as f64 / self.sample_rate as f64;
        BatchOutput {
            samples,
            total_samples,
            total_chunks: self.chunks.load(Ordering::Acquire),
            duration,
            sample_rate: self.sample_rate,
        }
    }
}

#[async_trait]
impl RenderControl for BatchCollector {
    async fn on_chunk(&self, chunk: Chunk) -> Result<(), RenderError> {
        self.samples.lock().extend_from_slice(&chunk.samples);
        self.chunks.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn should_resume(&self, _rendered_duration: f64) -> bool {
        !self.cancel.is_cancelled()
    }

    fn on_buffer_full(&self, _rendered_duration: f64) {}

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
