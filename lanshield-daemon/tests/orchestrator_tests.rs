//! Orchestrator integration tests.
//!
//! Full flow with a replayed capture: build -> start -> frames through the
//! monitor -> alerts persisted -> shutdown.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use lanshield_core::collab::{AlertStore, NoopDeviceResolver, NoopReputation};
use lanshield_core::config::{CaptureConfig, LanshieldConfig};
use lanshield_core::error::{CaptureError, StorageError};
use lanshield_core::pipeline::{BoxFuture, HealthStatus};
use lanshield_core::types::{Alert, AlertType};
use lanshield_daemon::monitor::Collaborators;
use lanshield_daemon::orchestrator::Orchestrator;
use lanshield_packet_engine::{CaptureBackend, CaptureDevice, RawFrame, UnavailableBackend};

// --- frames ---

const HOST: [u8; 6] = [0x02, 0, 0, 0, 0, 0x50];
const GATEWAY: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];

fn tcp_syn(dst_port: u16) -> Vec<u8> {
    let mut tcp = Vec::new();
    tcp.extend_from_slice(&40_000u16.to_be_bytes());
    tcp.extend_from_slice(&dst_port.to_be_bytes());
    tcp.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0x50, 0x02, 0xff, 0xff, 0, 0, 0, 0]);

    let total_len = (20 + tcp.len()) as u16;
    let mut ip = vec![0x45, 0x00];
    ip.extend_from_slice(&total_len.to_be_bytes());
    ip.extend_from_slice(&[0, 0, 0x40, 0, 64, 6, 0, 0]);
    ip.extend_from_slice(&[192, 168, 1, 50]);
    ip.extend_from_slice(&[192, 168, 1, 1]);
    ip.extend_from_slice(&tcp);

    let mut frame = Vec::new();
    frame.extend_from_slice(&GATEWAY);
    frame.extend_from_slice(&HOST);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(&ip);
    frame
}

// --- test doubles ---

struct ReplayDevice {
    frames: VecDeque<Vec<u8>>,
}

impl CaptureDevice for ReplayDevice {
    fn name(&self) -> &str {
        "replay0"
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        match self.frames.pop_front() {
            Some(data) => Ok(Some(RawFrame::new(data, Utc::now()))),
            None => Err(CaptureError::Closed),
        }
    }
}

struct ReplayBackend {
    frames: Mutex<Option<Vec<Vec<u8>>>>,
}

impl ReplayBackend {
    fn new(frames: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Some(frames)),
        })
    }
}

impl CaptureBackend for ReplayBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let frames = self.frames.lock().take().ok_or(CaptureError::Open {
            device: config.interface.clone(),
            reason: "replay exhausted".to_owned(),
        })?;
        Ok(Box::new(ReplayDevice {
            frames: frames.into(),
        }))
    }
}

#[derive(Default)]
struct RecordingStore {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertStore for RecordingStore {
    fn persist(&self, alert: Alert) -> BoxFuture<'_, Result<(), StorageError>> {
        self.alerts.lock().push(alert);
        Box::pin(async { Ok(()) })
    }

    fn has_active_alert(
        &self,
        _alert_type: AlertType,
        _source: String,
    ) -> BoxFuture<'_, Result<bool, StorageError>> {
        Box::pin(async { Ok(false) })
    }
}

fn test_config() -> LanshieldConfig {
    let mut config = LanshieldConfig::default();
    config.general.pid_file = String::new();
    config.capture.interface = "replay0".to_owned();
    config.capture.read_timeout_ms = 10;
    config
}

fn collaborators(store: Arc<RecordingStore>) -> Collaborators {
    Collaborators {
        resolver: Arc::new(NoopDeviceResolver),
        reputation: Arc::new(NoopReputation),
        store,
    }
}

/// Poll until the capture thread has run out of frames.
async fn wait_for_capture_end(orchestrator: &Orchestrator) {
    for _ in 0..500 {
        let health = orchestrator.health().await;
        if let HealthStatus::Degraded(reason) = &health.status
            && reason.contains("capture loop exited")
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("capture did not finish in time");
}

// --- scenarios ---

#[tokio::test]
async fn replayed_capture_flows_to_alert_store() {
    let store = Arc::new(RecordingStore::default());
    let frames = vec![tcp_syn(443), tcp_syn(3389), tcp_syn(3389), tcp_syn(443)];
    let mut orchestrator = Orchestrator::build_from_config(
        test_config(),
        ReplayBackend::new(frames),
        collaborators(store.clone()),
    )
    .unwrap();

    orchestrator.start().await.unwrap();
    wait_for_capture_end(&orchestrator).await;
    orchestrator.shutdown().await.unwrap();

    let monitor = orchestrator.monitor();
    let talkers = monitor.top_talkers(5);
    assert_eq!(talkers[0].packets_sent, 4);

    let stats = monitor.dispatcher_stats();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.total, stats.sent + stats.suppressed);

    let persisted = store.alerts.lock();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].alert_type, AlertType::SuspiciousPort);
}

#[tokio::test]
async fn modules_register_in_start_order() {
    let orchestrator = Orchestrator::build_from_config(
        test_config(),
        ReplayBackend::new(Vec::new()),
        Collaborators::default(),
    )
    .unwrap();
    assert_eq!(
        orchestrator.module_names(),
        vec!["alert-dispatcher", "telemetry", "packet-engine"]
    );
}

#[tokio::test]
async fn unavailable_capture_degrades_but_keeps_running() {
    let mut orchestrator = Orchestrator::build_from_config(
        test_config(),
        Arc::new(UnavailableBackend),
        Collaborators::default(),
    )
    .unwrap();

    orchestrator.start().await.unwrap();
    let health = orchestrator.health().await;
    match &health.status {
        HealthStatus::Degraded(reason) => {
            assert!(reason.contains("packet-engine: capture unavailable"), "{reason}");
        }
        other => panic!("expected degraded, got {other}"),
    }

    // the rest of the pipeline still accepts alerts
    let alert = Alert::new(
        AlertType::NewDevice,
        lanshield_core::types::Severity::Low,
        "new device",
        "seen",
    )
    .with_source_ip("192.168.1.77".parse().ok());
    assert!(orchestrator.monitor().submit_alert(alert).is_accepted());

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn disabled_capture_is_healthy() {
    let mut config = test_config();
    config.capture.enabled = false;
    let mut orchestrator =
        Orchestrator::build_from_config(config, Arc::new(UnavailableBackend), Collaborators::default())
            .unwrap();

    orchestrator.start().await.unwrap();
    let health = orchestrator.health().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert!(health.modules.iter().any(|m| m.name == "packet-engine" && !m.enabled));
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = test_config();
    config.capture.channel_capacity = 0;
    let result = Orchestrator::build_from_config(
        config,
        Arc::new(UnavailableBackend),
        Collaborators::default(),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn health_serializes_for_status_output() {
    let orchestrator = Orchestrator::build_from_config(
        test_config(),
        Arc::new(UnavailableBackend),
        Collaborators::default(),
    )
    .unwrap();
    let json = serde_json::to_value(orchestrator.health().await).unwrap();
    assert_eq!(json["modules"].as_array().unwrap().len(), 3);
    assert_eq!(json["status"]["status"], "unhealthy");
}
