//! Packet ingestion module.
//!
//! ```text
//! capture thread --PacketEvent--> event_rx --> processor task --> Monitor
//! ```
//!
//! A capture device that cannot be opened is not fatal: the module stays
//! registered, reports `Degraded("capture unavailable: ...")`, and the rest of
//! the daemon keeps running.
//!
//! Shutdown order: cancel the capture thread (which drops the sender), let the
//! processor drain whatever is still queued until the channel closes, then
//! flush aggregator state once.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lanshield_core::config::CaptureConfig;
use lanshield_core::error::{LanshieldError, PipelineError};
use lanshield_core::event::PacketEvent;
use lanshield_core::pipeline::{HealthStatus, Pipeline};
use lanshield_packet_engine::{CaptureBackend, PacketSource};

use crate::monitor::Monitor;

pub const MODULE_NAME: &str = lanshield_core::event::MODULE_PACKET_ENGINE;

pub struct IngestionModule {
    source: PacketSource,
    event_rx: Option<mpsc::Receiver<PacketEvent>>,
    monitor: Arc<Monitor>,
    processor: Option<JoinHandle<u64>>,
    running: bool,
}

impl IngestionModule {
    pub fn new(
        config: &CaptureConfig,
        backend: Arc<dyn CaptureBackend>,
        monitor: Arc<Monitor>,
    ) -> anyhow::Result<Self> {
        let (source, event_rx) = PacketSource::builder()
            .config(config.clone())
            .backend(backend)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build packet source: {e}"))?;
        Ok(Self {
            source,
            event_rx: Some(event_rx),
            monitor,
            processor: None,
            running: false,
        })
    }

    /// Whether frames are actually flowing into the monitor.
    pub fn is_capturing(&self) -> bool {
        self.processor.as_ref().is_some_and(|p| !p.is_finished())
    }
}

impl Pipeline for IngestionModule {
    async fn start(&mut self) -> Result<(), LanshieldError> {
        if self.running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        match self.source.start().await {
            Ok(()) => {
                let rx = self.event_rx.take().ok_or_else(|| {
                    PipelineError::InitFailed("event receiver already consumed".to_owned())
                })?;
                self.processor = Some(tokio::spawn(process_events(rx, Arc::clone(&self.monitor))));
            }
            Err(LanshieldError::Capture(e)) => {
                tracing::warn!(error = %e, "capture unavailable, continuing without ingestion");
            }
            Err(e) => return Err(e),
        }

        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LanshieldError> {
        if !self.running {
            return Err(PipelineError::NotRunning.into());
        }
        self.running = false;

        if let Some(processor) = self.processor.take() {
            self.source.stop().await?;
            match processor.await {
                Ok(processed) => tracing::info!(processed, "packet processor drained"),
                Err(e) => tracing::warn!(error = %e, "packet processor ended abnormally"),
            }
        }

        self.monitor.flush(Utc::now()).await;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if !self.running {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        let status = self.source.health_check().await;
        if status.is_healthy() && self.processor.as_ref().is_some_and(|p| p.is_finished()) {
            return HealthStatus::Degraded("packet processor exited".to_owned());
        }
        status
    }
}

/// Feed every event into the monitor until all senders are gone.
async fn process_events(mut rx: mpsc::Receiver<PacketEvent>, monitor: Arc<Monitor>) -> u64 {
    let mut processed = 0;
    while let Some(event) = rx.recv().await {
        monitor.process_packet(event).await;
        processed += 1;
    }
    processed
}
