//! Built-in deterministic renderer.
//!
//! Stands in for the external synthesis engine so the binary runs
//! end-to-end and the scheduler/pacer are testable. Produces a plain sine
//! tone whose frequency is derived from the genome bytes, honouring the
//! full [`RenderControl`] contract: ordered chunks, cooperative
//! backpressure polling, one-shot buffer-full notification, and prompt
//! cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Chunk, GenomeAndMeta, RenderControl, RenderError, RenderParams, Renderer};

/// Poll interval while paused by `should_resume`.
const RESUME_POLL: Duration = Duration::from_millis(5);

pub struct ToneRenderer;

impl ToneRenderer {
    /// Fold the genome text into a base frequency so equal inputs render
    /// equal audio.
    fn base_frequency(genome: &GenomeAndMeta) -> f64 {
        let text = genome.genome.to_string();
        let folded = text
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        110.0 + f64::from(folded % 880)
    }
}

#[async_trait]
impl Renderer for ToneRenderer {
    async fn render(
        &self,
        genome: &GenomeAndMeta,
        params: &RenderParams,
        control: Arc<dyn RenderControl>,
    ) -> Result<(), RenderError> {
        let sample_rate = params.sample_rate;
        let total_samples = (params.duration * f64::from(sample_rate)).round() as u64;
        let chunk_samples =
            ((params.chunk_duration * f64::from(sample_rate)).round() as usize).max(1);

        let frequency =
            Self::base_frequency(genome) * 2f64.powf(params.note_delta / 12.0);
        let amplitude = (params.velocity.clamp(0.0, 1.0) * 0.8) as f32;
        let step = 2.0 * std::f64::consts::PI * frequency / f64::from(sample_rate);

        let mut produced: u64 = 0;
        let mut index: u64 = 0;
        let mut buffer_full_sent = false;

        while produced < total_samples {
            if control.is_cancelled() {
                return Err(RenderError::Aborted);
            }

            let rendered = produced as f64 / f64::from(sample_rate);
            if !control.should_resume(rendered) {
                if !buffer_full_sent {
                    control.on_buffer_full(rendered);
                    buffer_full_sent = true;
                }
                tokio::time::sleep(RESUME_POLL).await;
                continue;
            }

            let remaining = (total_samples - produced) as usize;
            let len = remaining.min(chunk_samples);
            let mut samples = Vec::with_capacity(len);
            for i in 0..len {
                let t = (produced + i as u64) as f64;
                samples.push(amplitude * (step * t).sin() as f32);
            }

            produced += len as u64;
            index += 1;
            let chunk = Chunk {
                index,
                samples,
                timestamp: produced as f64 / f64::from(sample_rate),
                sample_rate,
            };
            control.on_chunk(chunk).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect {
        chunks: Mutex<Vec<Chunk>>,
        cancelled: AtomicBool,
        buffer_full: AtomicU64,
    }

    #[async_trait]
    impl RenderControl for Collect {
        async fn on_chunk(&self, chunk: Chunk) -> Result<(), RenderError> {
            self.chunks.lock().push(chunk);
            Ok(())
        }

        fn should_resume(&self, _rendered: f64) -> bool {
            true
        }

        fn on_buffer_full(&self, _rendered: f64) {
            self.buffer_full.fetch_add(1, Ordering::Relaxed);
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::Relaxed)
        }
    }

    fn genome() -> GenomeAndMeta {
        GenomeAndMeta {
            genome: serde_json::json!({"seed": 7}),
            duration: 0.5,
            note_delta: 0.0,
            velocity: 1.0,
            reverse: false,
        }
    }

    #[tokio::test]
    async fn chunk_sequence_is_ordered_and_complete() {
        let control = Arc::new(Collect::default());
        let params = RenderParams {
            duration: 0.5,
            sample_rate: 8_000,
            chunk_duration: 0.1,
            ..Default::default()
        };
        ToneRenderer
            .render(&genome(), &params, control.clone())
            .await
            .unwrap();

        let chunks = control.chunks.lock();
        assert_eq!(chunks.len(), 5);
        let mut last_ts = 0.0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u64 + 1);
            assert!(chunk.timestamp > last_ts);
            last_ts = chunk.timestamp;
        }
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(total, 4_000);
    }

    #[tokio::test]
    async fn same_genome_renders_identically() {
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let params = RenderParams {
            duration: 0.1,
            sample_rate: 8_000,
            ..Default::default()
        };
        ToneRenderer.render(&genome(), &params, a.clone()).await.unwrap();
        ToneRenderer.render(&genome(), &params, b.clone()).await.unwrap();
        let left: Vec<f32> = a.chunks.lock().iter().flat_map(|c| c.samples.clone()).collect();
        let right: Vec<f32> = b.chunks.lock().iter().flat_map(|c| c.samples.clone()).collect();
        assert_eq!(left, right);
    }

    #[tokio::test]
    async fn cancellation_stops_production() {
        let control = Arc::new(Collect::default());
        control.cancelled.store(true, Ordering::Relaxed);
        let params = RenderParams::default();
        let err = ToneRenderer
            .render(&genome(), &params, control.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Aborted));
        assert!(control.chunks.lock().is_empty());
    }
}
