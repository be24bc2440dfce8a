//! Daemon health report.
//!
//! The report combines the output service lifecycle status with the
//! routing counters and the destinations that are currently failing.
//! It is rendered as a single JSON line when the daemon stops.
//!
//! # Status Rule
//!
//! - Service not running -> Unhealthy (service reason)
//! - No output modules loaded -> Degraded
//! - Any destination with failures -> Degraded, naming each path
//! - Otherwise the service status

use serde::Serialize;

use logroute_core::pipeline::HealthStatus;
use logroute_output::DestinationFailure;
use logroute_output::service::ServiceStats;

/// Health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon status.
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Output engine counters and failing destinations.
    pub output: OutputHealth,
}

impl DaemonHealth {
    /// Render the report as one JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Snapshot of the output engine as seen through its service counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputHealth {
    /// Loaded output modules.
    pub modules: usize,
    /// Messages routed since start.
    pub routed: u64,
    /// Actions that failed while routing.
    pub action_failures: u64,
    /// Archives produced by checkpoints.
    pub rotations: u64,
    /// Destinations with a non-zero failure count.
    pub failing: Vec<DestinationFailure>,
}

impl OutputHealth {
    /// Take a snapshot of the service counters.
    pub fn from_stats(stats: &ServiceStats) -> Self {
        Self {
            modules: stats.modules(),
            routed: stats.routed(),
            action_failures: stats.action_failures(),
            rotations: stats.rotations(),
            failing: stats.destination_failures(),
        }
    }
}

/// Combine the service lifecycle status with the output snapshot.
pub fn assess(service: HealthStatus, output: &OutputHealth) -> HealthStatus {
    if service.is_unhealthy() {
        return service;
    }
    if output.modules == 0 {
        return HealthStatus::Degraded("no output modules loaded".to_owned());
    }
    if output.failing.is_empty() {
        return service;
    }

    let paths: Vec<String> = output
        .failing
        .iter()
        .map(|f| format!("{} ({} failures)", f.path, f.fails))
        .collect();
    HealthStatus::Degraded(format!(
        "{} destination(s) failing: {}",
        output.failing.len(),
        paths.join(", ")
    ))
}
