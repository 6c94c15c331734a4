//! Seam to the external synthesis engine.
//!
//! The engine itself is an out-of-scope collaborator: it turns an opaque
//! genome into PCM samples with unspecified internals. This module defines
//! the contract the scheduler needs from it: a single async `render` call
//! that emits ordered chunks through a [`RenderControl`] and finishes with
//! an explicit `Result` (no sentinel errors as completion signals).

pub mod genome;
pub mod params;
pub mod pcm;
pub mod tone;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use genome::{GenomeStore, GenomeStoreError};
pub use params::{GenomeAndMeta, RenderParams};

/// One ordered slice of rendered PCM audio.
///
/// `index` is 1-based and strictly increasing per job; `timestamp` is the
/// cumulative rendered duration in seconds after this chunk.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: u64,
    pub samples: Vec<f32>,
    pub timestamp: f64,
    pub sample_rate: u32,
}

/// Errors surfaced by the external render call.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The engine reported a failure of its own.
    #[error("{0}")]
    Engine(String),

    /// The chunk consumer went away mid-render.
    #[error("chunk receiver closed")]
    Disconnected,

    /// The render task was torn down by timeout or cancellation.
    #[error("render aborted")]
    Aborted,
}

/// Callbacks handed to the engine for one render invocation.
///
/// The engine pushes every produced chunk through [`on_chunk`] in order,
/// consults [`should_resume`] before producing more audio (cooperative
/// backpressure: pause and poll again later when it returns false), and
/// fires [`on_buffer_full`] once when the initial look-ahead has been
/// produced without any client feedback.
///
/// [`on_chunk`]: RenderControl::on_chunk
/// [`should_resume`]: RenderControl::should_resume
/// [`on_buffer_full`]: RenderControl::on_buffer_full
#[async_trait]
pub trait RenderControl: Send + Sync {
    async fn on_chunk(&self, chunk: Chunk) -> Result<(), RenderError>;

    /// True while the server wants more audio produced.
    fn should_resume(&self, rendered_duration: f64) -> bool;

    /// One-time notification that the initial look-ahead buffer is full.
    fn on_buffer_full(&self, rendered_duration: f64);

    /// Cooperative cancellation check; engines should stop producing
    /// chunks promptly once this returns true.
    fn is_cancelled(&self) -> bool;
}

/// The external genome→audio render function.
///
/// Must be deterministic for a given input; may take arbitrary wall time.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        genome: &GenomeAndMeta,
        params: &RenderParams,
        control: Arc<dyn RenderControl>,
    ) -> Result<(), RenderError>;
}
