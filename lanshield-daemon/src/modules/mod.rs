//! Daemon modules and their registry.
//!
//! Each subsystem is wrapped in a [`ModuleHandle`] so the orchestrator can
//! drive it through the object-safe [`DynPipeline`] trait.
//!
//! Registration order is start order; stop runs in reverse so the packet
//! producer stops first and the dispatcher, which everything feeds, stops last.

pub mod dispatcher;
pub mod ingestion;
pub mod maintenance;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use lanshield_core::pipeline::{DynPipeline, HealthStatus};

use crate::health::ModuleHealth;

/// A registered module with its name and enabled flag.
pub struct ModuleHandle {
    pub name: String,
    pub enabled: bool,
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
        }
    }

    /// Disabled modules always report `Healthy`.
    pub async fn health_check(&self) -> HealthStatus {
        if !self.enabled {
            return HealthStatus::Healthy;
        }
        self.pipeline.health_check().await
    }
}

/// Ordered collection of daemon modules.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
    /// Number of modules (from the front) that started successfully.
    started: usize,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Start enabled modules in registration order.
    ///
    /// On failure, modules started so far are stopped again in reverse order
    /// before the error is returned.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        for index in self.started..self.modules.len() {
            let handle = &mut self.modules[index];
            if !handle.enabled {
                tracing::debug!(module = %handle.name, "skipping disabled module");
                self.started = index + 1;
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            if let Err(e) = handle.pipeline.start().await {
                let err = anyhow::anyhow!("failed to start module '{}': {e}", handle.name);
                tracing::warn!(error = %err, "startup failed, rolling back started modules");
                if let Err(rollback) = self.stop_all().await {
                    tracing::error!(error = %rollback, "rollback after startup failure also failed");
                }
                return Err(err);
            }
            self.started = index + 1;
        }
        Ok(())
    }

    /// Stop started modules in reverse registration order.
    ///
    /// Keeps going after a failure and reports every error at the end.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        for handle in self.modules[..self.started].iter_mut().rev() {
            if !handle.enabled {
                continue;
            }
            tracing::info!(module = %handle.name, "stopping module");
            if let Err(e) = handle.pipeline.stop().await {
                tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                errors.push(format!("{}: {e}", handle.name));
            }
        }
        self.started = 0;

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("errors stopping modules: {}", errors.join("; ")))
        }
    }

    pub async fn health_statuses(&self) -> Vec<ModuleHealth> {
        let mut statuses = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            statuses.push(ModuleHealth {
                name: handle.name.clone(),
                enabled: handle.enabled,
                status: handle.health_check().await,
            });
        }
        statuses
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn count(&self) -> usize {
        self.modules.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }
}

/// Spawn a timer task that calls `task` every `period` until `cancel` fires.
///
/// The first call happens one full period after spawning. A zero period is
/// raised to one second.
pub(crate) fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut(DateTime<Utc>) + Send + 'static,
{
    spawn_periodic_async(name, period, cancel, move |now| {
        task(now);
        std::future::ready(())
    })
}

/// Like [`spawn_periodic`], but awaits each run before waiting for the next tick.
pub(crate) fn spawn_periodic_async<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut(DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let period = period.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => task(Utc::now()).await,
                () = cancel.cancelled() => break,
            }
        }
        tracing::debug!(timer = name, "periodic task stopped");
    })
}

/// Await every handle, logging tasks that panicked.
pub(crate) async fn join_all(tasks: Vec<(&'static str, JoinHandle<()>)>) {
    for (name, task) in tasks {
        if let Err(e) = task.await {
            tracing::warn!(task = name, error = %e, "background task ended abnormally");
        }
    }
}
