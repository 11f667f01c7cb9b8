//! Module orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] builds the shared [`Monitor`], wraps each subsystem
//! in a module, and drives startup and shutdown.
//!
//! # Startup order (consumers before producers)
//!
//! 1. Alert dispatcher (persister task, cooldown sweep)
//! 2. Maintenance (aggregator timers)
//! 3. Ingestion (capture thread and packet processor)
//!
//! # Shutdown order (reverse)
//!
//! 1. Ingestion: cancel capture, drain the bus, flush aggregators
//! 2. Maintenance: stop timers
//! 3. Alert dispatcher: persist whatever the flush produced, then stop

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use lanshield_core::config::LanshieldConfig;
use lanshield_packet_engine::{CaptureBackend, default_backend};

use crate::health::{DaemonHealth, aggregate_status};
use crate::modules::dispatcher::{self, DispatcherModule};
use crate::modules::ingestion::{self, IngestionModule};
use crate::modules::maintenance::{self, MaintenanceModule};
use crate::modules::{ModuleHandle, ModuleRegistry};
use crate::monitor::{Collaborators, Monitor};
use crate::pid_file::PidFile;

pub struct Orchestrator {
    config: LanshieldConfig,
    monitor: Arc<Monitor>,
    modules: ModuleRegistry,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `lanshield.toml` (plus environment overrides) and build.
    ///
    /// Uses the default capture backend and no-op collaborators.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LanshieldConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
        Self::build_from_config(config, default_backend(), Collaborators::default())
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a component rejects its
    /// configuration.
    pub fn build_from_config(
        config: LanshieldConfig,
        backend: Arc<dyn CaptureBackend>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

        let monitor = Arc::new(Monitor::new(&config, collaborators)?);
        let mut modules = ModuleRegistry::new();

        modules.register(ModuleHandle::new(
            dispatcher::MODULE_NAME,
            true,
            Box::new(DispatcherModule::new(Arc::clone(&monitor))),
        ));
        modules.register(ModuleHandle::new(
            maintenance::MODULE_NAME,
            true,
            Box::new(MaintenanceModule::new(&config, Arc::clone(&monitor))),
        ));
        modules.register(ModuleHandle::new(
            ingestion::MODULE_NAME,
            config.capture.enabled,
            Box::new(IngestionModule::new(
                &config.capture,
                backend,
                Arc::clone(&monitor),
            )?),
        ));

        tracing::info!(
            modules = modules.count(),
            enabled = modules.enabled_count(),
            interface = %config.capture.interface,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            monitor,
            modules,
            start_time: Instant::now(),
        })
    }

    /// Start every enabled module. Rolls back on failure.
    pub async fn start(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        self.modules.start_all().await?;

        let health = self.health().await;
        if !health.status.is_healthy() {
            tracing::warn!(status = %health.status, "daemon started in reduced state");
        }
        tracing::info!("all modules started");
        Ok(())
    }

    /// Stop every started module in reverse order.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.modules.stop_all().await
    }

    /// Write the PID file, start, and block until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        let _pid_file = match self.config.general.pid_file.as_str() {
            "" => None,
            path => Some(PidFile::create(path)?),
        };

        self.start().await?;

        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal, "shutdown signal received");

        self.shutdown().await
    }

    pub async fn health(&self) -> DaemonHealth {
        let modules = self.modules.health_statuses().await;
        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
            detector_failures: self.monitor.detector_failures(),
        }
    }

    /// Shared monitoring state, for queries and alert subscriptions.
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn config(&self) -> &LanshieldConfig {
        &self.config
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.names()
    }
}

/// Returns the name of the signal that fired.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
