//! Aggregator maintenance timers.
//!
//! | timer              | default | work                                     |
//! |--------------------|---------|------------------------------------------|
//! | telemetry tick     | 1s      | live rates, health score gauges          |
//! | detector release   | 1s      | held port scan alerts that went quiet    |
//! | telemetry cleanup  | 1m      | idle connections/talkers, old hours      |
//! | bandwidth evaluate | 1m      | threshold and quota alerts               |
//! | bandwidth cleanup  | 1h      | inactive devices, stale alert cooldowns  |
//! | status report      | 1m      | one info log line with the summary       |
//! | uptime             | 10s     | uptime gauge (only with metrics enabled) |

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lanshield_core::config::LanshieldConfig;
use lanshield_core::error::{LanshieldError, PipelineError};
use lanshield_core::metrics as m;
use lanshield_core::pipeline::{HealthStatus, Pipeline};

use super::{join_all, spawn_periodic, spawn_periodic_async};
use crate::monitor::Monitor;

pub const MODULE_NAME: &str = lanshield_core::event::MODULE_TELEMETRY;

const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(60);
const UPTIME_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
struct Intervals {
    tick: Duration,
    cleanup: Duration,
    bandwidth_eval: Option<Duration>,
    bandwidth_cleanup: Option<Duration>,
    uptime: Option<Duration>,
}

impl Intervals {
    fn from_config(config: &LanshieldConfig) -> Self {
        let bandwidth = config.bandwidth.enabled;
        Self {
            tick: Duration::from_secs(config.telemetry.tick_interval_secs),
            cleanup: Duration::from_secs(config.telemetry.cleanup_interval_secs),
            bandwidth_eval: bandwidth
                .then(|| Duration::from_secs(config.bandwidth.evaluation_interval_secs)),
            bandwidth_cleanup: bandwidth
                .then(|| Duration::from_secs(config.bandwidth.cleanup_interval_secs)),
            uptime: config.metrics.enabled.then_some(UPTIME_INTERVAL),
        }
    }
}

pub struct MaintenanceModule {
    monitor: Arc<Monitor>,
    intervals: Intervals,
    started_at: Instant,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl MaintenanceModule {
    pub fn new(config: &LanshieldConfig, monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            intervals: Intervals::from_config(config),
            started_at: Instant::now(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    fn spawn_timers(&mut self) {
        let intervals = self.intervals;

        let monitor = Arc::clone(&self.monitor);
        self.tasks.push((
            "telemetry-tick",
            spawn_periodic("telemetry-tick", intervals.tick, self.cancel.clone(), move |now| {
                monitor.tick(now)
            }),
        ));

        let monitor = Arc::clone(&self.monitor);
        self.tasks.push((
            "detector-release",
            spawn_periodic_async(
                "detector-release",
                intervals.tick,
                self.cancel.clone(),
                move |now| {
                    let monitor = Arc::clone(&monitor);
                    async move {
                        let accepted = monitor.release_held_alerts(now, false).await;
                        if accepted > 0 {
                            tracing::debug!(accepted, "held detector alerts released");
                        }
                    }
                },
            ),
        ));

        let monitor = Arc::clone(&self.monitor);
        self.tasks.push((
            "telemetry-cleanup",
            spawn_periodic(
                "telemetry-cleanup",
                intervals.cleanup,
                self.cancel.clone(),
                move |now| monitor.cleanup(now),
            ),
        ));

        if let Some(period) = intervals.bandwidth_eval {
            let monitor = Arc::clone(&self.monitor);
            self.tasks.push((
                "bandwidth-evaluate",
                spawn_periodic("bandwidth-evaluate", period, self.cancel.clone(), move |now| {
                    let outcomes = monitor.evaluate_bandwidth(now);
                    if !outcomes.is_empty() {
                        tracing::debug!(alerts = outcomes.len(), "bandwidth evaluation produced alerts");
                    }
                }),
            ));
        }

        if let Some(period) = intervals.bandwidth_cleanup {
            let monitor = Arc::clone(&self.monitor);
            self.tasks.push((
                "bandwidth-cleanup",
                spawn_periodic("bandwidth-cleanup", period, self.cancel.clone(), move |now| {
                    monitor.cleanup_bandwidth(now)
                }),
            ));
        }

        let monitor = Arc::clone(&self.monitor);
        self.tasks.push((
            "status-report",
            spawn_periodic(
                "status-report",
                STATUS_REPORT_INTERVAL,
                self.cancel.clone(),
                move |_| {
                    let report = monitor.status_report();
                    tracing::info!(
                        health_score = report.health.score,
                        health = ?report.health.band,
                        devices = report.summary.device_count,
                        bytes_per_sec = report.summary.bytes_per_sec,
                        alerts_sent = report.dispatcher.sent,
                        alerts_suppressed = report.dispatcher.suppressed,
                        "network status"
                    );
                },
            ),
        ));

        if let Some(period) = intervals.uptime {
            let started_at = self.started_at;
            self.tasks.push((
                "uptime",
                spawn_periodic("uptime", period, self.cancel.clone(), move |_| {
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(started_at.elapsed().as_secs_f64());
                }),
            ));
        }
    }
}

impl Pipeline for MaintenanceModule {
    async fn start(&mut self) -> Result<(), LanshieldError> {
        if !self.tasks.is_empty() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.cancel = CancellationToken::new();
        // baseline for the first rate window
        self.monitor.tick(Utc::now());
        self.spawn_timers();
        tracing::info!(timers = self.tasks.len(), "maintenance timers started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LanshieldError> {
        if self.tasks.is_empty() {
            return Err(PipelineError::NotRunning.into());
        }
        self.cancel.cancel();
        join_all(std::mem::take(&mut self.tasks)).await;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.tasks.is_empty() {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        let stopped: Vec<_> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.is_finished())
            .map(|(name, _)| *name)
            .collect();
        if stopped.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(format!("timers stopped: {}", stopped.join(", ")))
        }
    }
}
