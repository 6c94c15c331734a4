//! Inputs to one render invocation.

use serde::{Deserialize, Serialize};

/// Opaque genome plus the playing metadata the engine expects alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeAndMeta {
    pub genome: serde_json::Value,
    pub duration: f64,
    pub note_delta: f64,
    pub velocity: f64,
    pub reverse: bool,
}

/// Numeric rendering parameters, immutable once the request is admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderParams {
    /// Target duration in seconds.
    pub duration: f64,
    /// Pitch offset in semitones.
    pub note_delta: f64,
    /// Note velocity in [0, 1].
    pub velocity: f64,
    /// Synthesis-quality flag forwarded to the engine.
    pub use_gpu: bool,
    pub sample_rate: u32,
    /// Preferred chunk length in seconds for incremental delivery.
    pub chunk_duration: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            duration: 1.0,
            note_delta: 0.0,
            velocity: 1.0,
            use_gpu: false,
            sample_rate: 48_000,
            chunk_duration: 0.25,
        }
    }
}
