//! Health check support.
//!
//! Backs the REST side-channel with liveness, readiness, and a full
//! report covering worker occupancy, queue depth, and connection load.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::scheduler::WorkerOccupancy;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_connections: bool,
    pub workers_total: usize,
    pub workers_busy: usize,
    pub workers_idle: usize,
    pub jobs_active: usize,
    pub queue_depth: usize,
    pub connections_open: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Queue depth at which the service reports Degraded.
    pub degraded_queue_depth: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { degraded_queue_depth: 128 }
    }
}

/// Point-in-time load figures gathered from the running components.
#[derive(Debug, Clone, Copy)]
pub struct LoadSnapshot {
    pub workers: WorkerOccupancy,
    pub jobs_active: usize,
    pub queue_depth: usize,
    pub connections_open: usize,
}

/// Aggregates health information from service components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self { config, start_time: Instant::now() }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: accepting traffic.
    pub fn is_ready(&self, shutdown_state: ShutdownState, queue_depth: usize) -> bool {
        if shutdown_state != ShutdownState::Running {
            return false;
        }
        queue_depth < self.config.degraded_queue_depth
    }

    /// Generate full health report.
    pub fn report(&self, shutdown_state: ShutdownState, load: LoadSnapshot) -> HealthReport {
        let accepting = shutdown_state == ShutdownState::Running;
        let ready = self.is_ready(shutdown_state, load.queue_depth);
        let state = self.compute_state(shutdown_state, load.queue_depth);

        HealthReport {
            state,
            ready,
            accepting_connections: accepting,
            workers_total: load.workers.total,
            workers_busy: load.workers.busy,
            workers_idle: load.workers.idle,
            jobs_active: load.jobs_active,
            queue_depth: load.queue_depth,
            connections_open: load.connections_open,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, shutdown_state: ShutdownState, queue_depth: usize) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if queue_depth >= self.config.degraded_queue_depth {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(queue_depth: usize) -> LoadSnapshot {
        LoadSnapshot {
            workers: WorkerOccupancy { total: 4, busy: 1, idle: 3 },
            jobs_active: 1,
            queue_depth,
            connections_open: 2,
        }
    }

    #[test]
    fn healthy_while_running_with_headroom() {
        let checker = HealthChecker::default();
        let report = checker.report(ShutdownState::Running, load(0));
        assert_eq!(report.state, HealthState::Healthy);
        assert!(report.ready);
        assert!(report.accepting_connections);
        assert_eq!(report.workers_idle, 3);
    }

    #[test]
    fn deep_queue_degrades() {
        let checker = HealthChecker::new(HealthConfig { degraded_queue_depth: 8 });
        let report = checker.report(ShutdownState::Running, load(8));
        assert_eq!(report.state, HealthState::Degraded);
        assert!(!report.ready);
        assert!(report.accepting_connections);
    }

    #[test]
    fn draining_is_unhealthy() {
        let checker = HealthChecker::default();
        let report = checker.report(ShutdownState::Draining, load(0));
        assert_eq!(report.state, HealthState::Unhealthy);
        assert!(!report.ready);
        assert!(!report.accepting_connections);
    }

    #[test]
    fn report_serializes_camel_case() {
        let checker = HealthChecker::default();
        let report = checker.report(ShutdownState::Running, load(3));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "healthy");
        assert_eq!(json["queueDepth"], 3);
        assert_eq!(json["workersBusy"], 1);
    }
}
