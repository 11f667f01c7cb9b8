//! Aggregated health reporting.
//!
//! The overall daemon status is the worst status among enabled modules:
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reasons)
//! - Any Unhealthy -> Unhealthy(reasons)
//!
//! A failed capture device surfaces here as
//! `Degraded("packet-engine: capture unavailable: ...")` while the rest of the
//! daemon keeps running.

use serde::Serialize;

use lanshield_core::pipeline::HealthStatus;
use lanshield_packet_engine::DetectorFailures;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub modules: Vec<ModuleHealth>,
    /// Per-detector failure counters since start.
    pub detector_failures: Vec<DetectorFailures>,
}

/// Health status for a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
}

/// Fold module statuses into one, keeping the reason of every non-healthy module.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut unhealthy = Vec::new();
    let mut degraded = Vec::new();

    for module in modules.iter().filter(|m| m.enabled) {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => degraded.push(format!("{}: {reason}", module.name)),
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {reason}", module.name));
            }
        }
    }

    if !unhealthy.is_empty() {
        unhealthy.extend(degraded);
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}
