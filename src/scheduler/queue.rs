//! Admission queue and worker-slot accounting.
//!
//! One object owns both the slot count and the FIFO of waiting jobs;
//! `submit` and slot release are its only mutation points. Releasing a slot
//! is the sole trigger for queue progress; there is no polling. Ordering
//! is strictly arrival order; no priority, no preemption.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::telemetry;

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Maximum concurrently Running jobs (N worker slots).
    pub max_concurrent: usize,
    /// Bound on the FIFO of waiting jobs; excess submissions are refused.
    pub max_queued: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_concurrent: 2, max_queued: 256 }
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("admission queue is full ({0} waiting)")]
    QueueFull(usize),
}

/// Exclusive capacity token: a job may run only while holding one.
/// Dropping the permit releases the slot and admits the queue head.
pub struct SlotPermit {
    queue: Option<Arc<AdmissionQueue>>,
}

impl SlotPermit {
    fn new(queue: Arc<AdmissionQueue>) -> Self {
        Self { queue: Some(queue) }
    }

    /// Detach without releasing; used internally when a handoff fails and
    /// the release is accounted for manually.
    fn forget(mut self) {
        self.queue = None;
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.release();
        }
    }
}

/// Outcome of a submission.
pub enum Admission {
    /// A slot was free; the job is Running.
    Admitted(SlotPermit),
    /// All slots busy; the job waits its turn.
    Queued(QueueTicket),
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Admission::Admitted(_) => f.write_str("Admitted"),
            Admission::Queued(ticket) => {
                f.debug_struct("Queued").field("position", &ticket.position).finish()
            }
        }
    }
}

/// Receipt for a queued job. Await [`QueueTicket::wait`] to obtain the
/// permit once the head of the queue is reached.
pub struct QueueTicket {
    rx: oneshot::Receiver<SlotPermit>,
    pub position: usize,
}

impl QueueTicket {
    /// Wait for admission. Resolves to `None` immediately if the job's
    /// cancellation token fires first; the job is then skipped at release
    /// time without ever running.
    pub async fn wait(self, cancel: &CancellationToken) -> Option<SlotPermit> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            permit = self.rx => permit.ok(),
        }
    }
}

struct Waiter {
    permit_tx: oneshot::Sender<SlotPermit>,
    cancel: CancellationToken,
}

struct Inner {
    running: usize,
    queue: VecDeque<Waiter>,
}

/// The scheduler object: N worker slots plus a FIFO admission queue.
pub struct AdmissionQueue {
    inner: Mutex<Inner>,
    config: AdmissionConfig,
}

impl AdmissionQueue {
    pub fn new(config: AdmissionConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner { running: 0, queue: VecDeque::new() }),
            config,
        })
    }

    /// Admit immediately if a slot is free, otherwise append to the FIFO.
    ///
    /// The job's `cancel` token lets a queued job be abandoned without
    /// running: a cancelled waiter is skipped when its turn comes.
    pub fn submit(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<Admission, AdmissionError> {
        let mut inner = self.inner.lock();
        if inner.running < self.config.max_concurrent {
            inner.running += 1;
            telemetry::gauge_jobs_active(inner.running);
            return Ok(Admission::Admitted(SlotPermit::new(Arc::clone(self))));
        }
        if inner.queue.len() >= self.config.max_queued {
            return Err(AdmissionError::QueueFull(inner.queue.len()));
        }
        let (permit_tx, rx) = oneshot::channel();
        inner.queue.push_back(Waiter { permit_tx, cancel });
        let position = inner.queue.len();
        telemetry::gauge_queue_depth(inner.queue.len());
        Ok(Admission::Queued(QueueTicket { rx, position }))
    }

    /// Release one slot and hand it to the first live waiter, skipping
    /// waiters that were cancelled while queued.
    fn release(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        inner.running -= 1;
        while let Some(waiter) = inner.queue.pop_front() {
            if waiter.cancel.is_cancelled() {
                continue;
            }
            inner.running += 1;
            if let Err(unclaimed) = waiter.permit_tx.send(SlotPermit::new(Arc::clone(self))) {
                // Receiver vanished between the cancel check and the send;
                // take the slot back and keep advancing.
                unclaimed.forget();
                inner.running -= 1;
                continue;
            }
            break;
        }
        telemetry::gauge_jobs_active(inner.running);
        telemetry::gauge_queue_depth(inner.queue.len());
    }

    /// Jobs currently holding a slot.
    pub fn active(&self) -> usize {
        self.inner.lock().running
    }

    /// Jobs waiting in the FIFO.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_concurrent
    }
}
