//! Render worker pool.
//!
//! A fixed set of worker tasks (default: CPU core count) each executing one
//! render at a time. Handoff is strict message passing: a task goes in over
//! a bounded channel, exactly one success/failure reply comes back over a
//! oneshot. Every render runs in its own spawned task so timeout and
//! cancellation can abort it at the runtime level, and a panicking render
//! is isolated from the worker loop and from other in-flight jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::engine::{GenomeAndMeta, RenderControl, RenderError, RenderParams, Renderer};

/// One unit of work handed to a worker.
pub struct RenderTask {
    pub genome: Arc<GenomeAndMeta>,
    pub params: RenderParams,
    pub control: Arc<dyn RenderControl>,
    /// Hard abort: fires when the owning job times out or is cancelled.
    pub abort: CancellationToken,
    pub reply: oneshot::Sender<Result<(), RenderError>>,
}

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Worker occupancy snapshot for the health side-channel.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkerOccupancy {
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
}

pub struct WorkerPool {
    task_tx: mpsc::Sender<RenderTask>,
    size: usize,
    busy: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `size` worker loops sharing one task channel.
    pub fn spawn(
        renderer: Arc<dyn Renderer>,
        size: usize,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let size = size.max(1);
        let (task_tx, task_rx) = mpsc::channel::<RenderTask>(size * 2);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let busy = Arc::new(AtomicUsize::new(0));

        for worker_id in 0..size {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&task_rx),
                Arc::clone(&renderer),
                Arc::clone(&busy),
                shutdown.clone(),
            ));
        }

        Arc::new(Self { task_tx, size, busy })
    }

    /// Hand a task to an idle worker, waiting if all are busy.
    pub async fn submit(&self, task: RenderTask) -> Result<(), WorkerPoolError> {
        self.task_tx
            .send(task)
            .await
            .map_err(|_| WorkerPoolError::ShutDown)
    }

    pub fn occupancy(&self) -> WorkerOccupancy {
        let busy = self.busy.load(Ordering::Relaxed).min(self.size);
        WorkerOccupancy {
            total: self.size,
            busy,
            idle: self.size - busy,
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    task_rx: Arc<Mutex<mpsc::Receiver<RenderTask>>>,
    renderer: Arc<dyn Renderer>,
    busy: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            task = async { task_rx.lock().await.recv().await } => match task {
                Some(task) => task,
                None => break,
            },
        };

        busy.fetch_add(1, Ordering::Relaxed);
        crate::telemetry::gauge_workers_busy(busy.load(Ordering::Relaxed));

        let result = execute(&renderer, &task).await;
        if let Err(RenderError::Engine(ref msg)) = result {
            tracing::warn!(worker_id, error = %msg, "render failed");
        }
        // The receiver may be gone (job already cancelled); the result is
        // then discarded, which is exactly the suppression the job wants.
        let _ = task.reply.send(result);

        busy.fetch_sub(1, Ordering::Relaxed);
        crate::telemetry::gauge_workers_busy(busy.load(Ordering::Relaxed));
    }
    tracing::debug!(worker_id, "render worker stopped");
}

/// Run one render in its own task so an abort tears it down without
/// taking the worker with it, and a panic is contained to the render.
async fn execute(renderer: &Arc<dyn Renderer>, task: &RenderTask) -> Result<(), RenderError> {
    let renderer = Arc::clone(renderer);
    let genome = Arc::clone(&task.genome);
    let params = task.params.clone();
    let control = Arc::clone(&task.control);

    let mut handle =
        tokio::spawn(async move { renderer.render(&genome, &params, control).await });

    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                Err(RenderError::Engine("render panicked".to_string()))
            }
            Err(_) => Err(RenderError::Aborted),
        },
        () = task.abort.cancelled() => {
            handle.abort();
            Err(RenderError::Aborted)
        }
    }
}
