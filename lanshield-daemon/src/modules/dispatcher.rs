//! Alert dispatcher module: the persister task plus the cooldown sweep timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lanshield_alert_dispatcher::SubscriberId;
use lanshield_core::error::{LanshieldError, PipelineError};
use lanshield_core::pipeline::{HealthStatus, Pipeline};

use super::spawn_periodic;
use crate::monitor::Monitor;

pub const MODULE_NAME: &str = lanshield_core::event::MODULE_ALERT_DISPATCHER;

pub struct DispatcherModule {
    monitor: Arc<Monitor>,
    sweep_interval: Duration,
    cancel: CancellationToken,
    subscriber: Option<SubscriberId>,
    persister: Option<JoinHandle<u64>>,
    sweeper: Option<JoinHandle<()>>,
}

impl DispatcherModule {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        let sweep_interval =
            Duration::from_secs(monitor.dispatcher().config().sweep_interval_secs);
        Self {
            monitor,
            sweep_interval,
            cancel: CancellationToken::new(),
            subscriber: None,
            persister: None,
            sweeper: None,
        }
    }
}

impl Pipeline for DispatcherModule {
    async fn start(&mut self) -> Result<(), LanshieldError> {
        if self.subscriber.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.cancel = CancellationToken::new();

        let (id, persister) = self
            .monitor
            .dispatcher()
            .attach_persister(self.monitor.alert_store());
        self.subscriber = Some(id);
        self.persister = Some(tokio::spawn(persister.run(self.cancel.clone())));

        let monitor = Arc::clone(&self.monitor);
        self.sweeper = Some(spawn_periodic(
            "cooldown-sweep",
            self.sweep_interval,
            self.cancel.clone(),
            move |now| {
                let evicted = monitor.sweep_cooldowns(now);
                if evicted > 0 {
                    tracing::debug!(evicted, "expired cooldown entries removed");
                }
            },
        ));

        tracing::info!(sweep_secs = self.sweep_interval.as_secs(), "alert dispatcher started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LanshieldError> {
        let Some(id) = self.subscriber.take() else {
            return Err(PipelineError::NotRunning.into());
        };
        // no new alerts reach the persist channel after this
        self.monitor.dispatcher().unsubscribe(id);
        self.cancel.cancel();

        if let Some(sweeper) = self.sweeper.take()
            && let Err(e) = sweeper.await
        {
            tracing::warn!(error = %e, "cooldown sweeper ended abnormally");
        }
        if let Some(persister) = self.persister.take() {
            match persister.await {
                Ok(stored) => tracing::info!(stored, "alert dispatcher stopped"),
                Err(e) => tracing::warn!(error = %e, "alert persister ended abnormally"),
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.subscriber.is_none() {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        if self.persister.as_ref().is_some_and(|p| p.is_finished()) {
            return HealthStatus::Degraded("alert persister exited".to_owned());
        }
        if self.sweeper.as_ref().is_some_and(|s| s.is_finished()) {
            return HealthStatus::Degraded("cooldown sweeper exited".to_owned());
        }
        HealthStatus::Healthy
    }
}
