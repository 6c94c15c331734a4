//! Batch delivery: accumulation, peak normalization, and the
//! announce/binary/complete frame sequence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use phenosynth_render::engine::pcm;
use phenosynth_render::engine::tone::ToneRenderer;
use phenosynth_render::engine::{GenomeStore, GenomeStoreError};
use phenosynth_render::scheduler::{AdmissionConfig, AdmissionQueue, WorkerPool};
use phenosynth_render::stream::PacerConfig;
use phenosynth_render::ws::session::{
    InboundFrame, OutboundFrame, Session, SessionConfig, SessionContext,
};

struct AnyStore;

#[async_trait]
impl GenomeStore for AnyStore {
    async fn load(&self, id: &str) -> Result<serde_json::Value, GenomeStoreError> {
        Ok(serde_json::json!({"id": id}))
    }
}

fn context() -> Arc<SessionContext> {
    let shutdown = CancellationToken::new();
    Arc::new(SessionContext {
        admission: AdmissionQueue::new(AdmissionConfig::default()),
        workers: WorkerPool::spawn(Arc::new(ToneRenderer), 2, shutdown.clone()),
        store: Arc::new(AnyStore),
        config: SessionConfig {
            sample_rate: 8_000,
            chunk_duration: 0.05,
            render_timeout: Duration::from_secs(10),
            // Irrelevant in batch mode; nothing throttles.
            pacer: PacerConfig { buffer_ahead: 0.01, initial_buffer: 0.01 },
            max_message_size: 64 * 1024,
        },
        shutdown,
    })
}

#[tokio::test]
async fn batch_sequence_is_result_then_binary_then_complete() {
    let ctx = context();
    let (in_tx, in_rx) = mpsc::channel(4);
    let (out_tx, mut out_rx) = mpsc::channel(64);
    let driver = tokio::spawn(Session::new(ctx, 1).run(in_rx, out_tx));

    in_tx
        .send(InboundFrame::Text(
            r#"{"type":"render","requestId":"b-1","genomeId":"g","duration":0.25,"batch":true}"#
                .into(),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(in_tx);
    driver.await.unwrap();

    // Record frame kinds in arrival order.
    let mut kinds = Vec::new();
    let mut binary = Vec::new();
    let mut batch_result = serde_json::Value::Null;
    let mut complete = serde_json::Value::Null;
    while let Some(frame) = out_rx.recv().await {
        match frame {
            OutboundFrame::Text(t) => {
                let m: serde_json::Value = serde_json::from_str(&t).unwrap();
                let kind = m["type"].as_str().unwrap().to_string();
                if kind == "batch-result" {
                    batch_result = m.clone();
                }
                if kind == "complete" {
                    complete = m.clone();
                }
                kinds.push(kind);
            }
            OutboundFrame::Binary(b) => {
                binary = b;
                kinds.push("binary".into());
            }
        }
    }
    assert_eq!(kinds, vec!["welcome", "batch-result", "binary", "complete"]);

    // 0.25 s at 8 kHz, four bytes per sample.
    let total_samples = batch_result["totalSamples"].as_u64().unwrap();
    assert_eq!(total_samples, 2_000);
    assert_eq!(binary.len() as u64, total_samples * 4);
    assert_eq!(complete["totalSamples"].as_u64().unwrap(), total_samples);
    assert!(complete["totalChunks"].as_u64().unwrap() > 0);

    // The payload is peak-normalized little-endian f32.
    let samples: Vec<f32> = binary
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!((peak - 1.0).abs() < 1e-4, "peak {peak} should normalize to full scale");
}

#[test]
fn peak_normalize_scales_to_unity_and_preserves_shape() {
    let mut samples = vec![0.1, -0.4, 0.2];
    pcm::peak_normalize(&mut samples);
    assert!((samples[1] + 1.0).abs() < 1e-6);
    assert!((samples[0] - 0.25).abs() < 1e-6);
    assert!((samples[2] - 0.5).abs() < 1e-6);
}

#[test]
fn peak_normalize_leaves_silence_alone() {
    let mut silence = vec![0.0f32; 16];
    pcm::peak_normalize(&mut silence);
    assert!(silence.iter().all(|s| *s == 0.0));
}
