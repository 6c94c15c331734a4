//! Connection limiting with RAII guards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Global connection limiter with atomic counting. Guards are owned so
/// they can ride along with a spawned socket task.
pub struct ConnectionLimiter {
    active: AtomicUsize,
    max_connections: usize,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize) -> Arc<Self> {
        Arc::new(Self { active: AtomicUsize::new(0), max_connections })
    }

    /// Try to acquire a connection slot. Returns a guard if available.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.active.load(Ordering::Relaxed);
            if current >= self.max_connections {
                return None;
            }
            if self
                .active
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Some(ConnectionGuard { limiter: Arc::clone(self) });
            }
            // CAS lost, retry
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII guard that releases the connection slot on drop.
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
