//! Shared monitoring state and the read-only query surface.
//!
//! [`Monitor`] owns the detector set, both aggregators, and the alert
//! dispatcher. The ingestion module feeds it one packet at a time; the
//! maintenance module drives its periodic work; everything else only reads.
//!
//! # Per-packet flow
//!
//! ```text
//! PacketEvent
//!   |-> BandwidthAggregator::record_packet
//!   |-> TrafficTelemetry::record_packet --(suspicious)--> AlertDispatcher
//!   `-> DetectorSet::inspect (detectors run concurrently) --> AlertDispatcher
//! ```
//!
//! Port scan alerts are held until the scan goes quiet. The maintenance
//! module releases them with [`Monitor::release_held_alerts`], and
//! [`Monitor::flush`] releases whatever is left on shutdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use lanshield_alert_dispatcher::{AlertDispatcher, DispatchOutcome, DispatcherStats, SubscriberId};
use lanshield_core::collab::{
    AlertStore, DeviceResolver, NoopAlertStore, NoopDeviceResolver, NoopReputation,
    ReputationLookup,
};
use lanshield_core::config::LanshieldConfig;
use lanshield_core::event::PacketEvent;
use lanshield_core::types::{Alert, MacAddr};
use lanshield_packet_engine::{DetectorFailures, DetectorSet};
use lanshield_telemetry::{
    BandwidthAggregator, ConnectionInfo, DeviceBandwidth, HourlyTraffic, NetworkHealth,
    NetworkSummary, ProtocolStats, SuspiciousActivity, TopTalker, TrafficTelemetry,
};

/// External services the pipeline consumes but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn DeviceResolver>,
    pub reputation: Arc<dyn ReputationLookup>,
    pub store: Arc<dyn AlertStore>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            resolver: Arc::new(NoopDeviceResolver),
            reputation: Arc::new(NoopReputation),
            store: Arc::new(NoopAlertStore),
        }
    }
}

/// Compact status snapshot logged by the maintenance loop.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub health: NetworkHealth,
    pub summary: NetworkSummary,
    pub dispatcher: DispatcherStats,
    pub detector_failures: Vec<DetectorFailures>,
}

pub struct Monitor {
    detectors: DetectorSet,
    bandwidth: BandwidthAggregator,
    bandwidth_enabled: bool,
    telemetry: TrafficTelemetry,
    report_suspicious: bool,
    dispatcher: AlertDispatcher,
    store: Arc<dyn AlertStore>,
}

impl Monitor {
    /// Build all components from configuration.
    pub fn new(config: &LanshieldConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        let detectors = DetectorSet::from_config(&config.detection, Arc::clone(&collaborators.store))
            .with_resolver(Arc::clone(&collaborators.resolver));
        let telemetry = TrafficTelemetry::new(config.telemetry.clone())
            .map_err(|e| anyhow::anyhow!("failed to build traffic telemetry: {e}"))?
            .with_reputation(collaborators.reputation)
            .with_resolver(collaborators.resolver);
        let dispatcher = AlertDispatcher::new(config.dispatcher.clone())
            .map_err(|e| anyhow::anyhow!("failed to build alert dispatcher: {e}"))?;

        tracing::debug!(detectors = ?detectors.names(), "monitor assembled");
        Ok(Self {
            detectors,
            bandwidth: BandwidthAggregator::new(config.bandwidth.clone()),
            bandwidth_enabled: config.bandwidth.enabled,
            telemetry,
            report_suspicious: config.telemetry.report_suspicious,
            dispatcher,
            store: collaborators.store,
        })
    }

    // --- packet path ---

    /// Run one packet through the aggregators and detectors.
    ///
    /// Returns the number of alerts the dispatcher accepted.
    pub async fn process_packet(&self, event: PacketEvent) -> usize {
        let event = Arc::new(event);

        if self.bandwidth_enabled {
            self.bandwidth.record_packet(&event);
        }

        let mut accepted = 0;
        if let Some(activity) = self.telemetry.record_packet(&event)
            && self.report_suspicious
        {
            accepted += usize::from(self.dispatcher.submit(activity.to_alert()).is_accepted());
        }

        for alert in self.detectors.inspect(Arc::clone(&event)).await {
            accepted += usize::from(self.dispatcher.submit(alert).is_accepted());
        }
        accepted
    }

    // --- periodic work ---

    pub fn tick(&self, now: DateTime<Utc>) {
        self.telemetry.tick(now);
    }

    /// Telemetry and detector tracker cleanup.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        self.telemetry.cleanup(now);
        self.detectors.cleanup_stale(now);
    }

    /// Evaluate bandwidth thresholds and quotas, submitting any alerts.
    pub fn evaluate_bandwidth(&self, now: DateTime<Utc>) -> Vec<DispatchOutcome> {
        if !self.bandwidth_enabled {
            return Vec::new();
        }
        self.bandwidth
            .evaluate(now)
            .into_iter()
            .map(|alert| self.dispatcher.submit(alert))
            .collect()
    }

    /// Submit held detector alerts that are due, or all of them with `force`.
    ///
    /// Returns the number of alerts the dispatcher accepted.
    pub async fn release_held_alerts(&self, now: DateTime<Utc>, force: bool) -> usize {
        self.detectors
            .release_pending(now, force)
            .await
            .into_iter()
            .map(|alert| self.dispatcher.submit(alert))
            .filter(|outcome| outcome.is_accepted())
            .count()
    }

    pub fn cleanup_bandwidth(&self, now: DateTime<Utc>) {
        self.bandwidth.cleanup(now);
    }

    pub fn sweep_cooldowns(&self, now: DateTime<Utc>) -> usize {
        self.dispatcher.sweep(now)
    }

    /// Final rate tick, held detector alerts, and bandwidth evaluation on shutdown.
    pub async fn flush(&self, now: DateTime<Utc>) {
        self.tick(now);
        let detector_alerts = self.release_held_alerts(now, true).await;
        let outcomes = self.evaluate_bandwidth(now);
        tracing::info!(
            detector_alerts,
            bandwidth_alerts = outcomes.iter().filter(|o| o.is_accepted()).count(),
            "aggregator state flushed"
        );
    }

    // --- alert consumption ---

    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F) -> SubscriberId
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(name, callback)
    }

    pub fn submit_alert(&self, alert: Alert) -> DispatchOutcome {
        self.dispatcher.submit(alert)
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn alert_store(&self) -> Arc<dyn AlertStore> {
        Arc::clone(&self.store)
    }

    pub fn recent_notifications(&self, n: usize) -> Vec<Alert> {
        self.dispatcher.recent_notifications(n)
    }

    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    // --- queries ---

    pub fn network_health(&self) -> NetworkHealth {
        self.telemetry.network_health()
    }

    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.telemetry.active_connections()
    }

    pub fn protocol_breakdown(&self) -> Vec<ProtocolStats> {
        self.telemetry.protocol_breakdown()
    }

    pub fn hourly_traffic(&self, hours: usize) -> Vec<HourlyTraffic> {
        self.telemetry.hourly_traffic(hours)
    }

    pub fn top_talkers(&self, n: usize) -> Vec<TopTalker> {
        self.telemetry.top_talkers(n)
    }

    pub fn suspicious_activities(&self, n: usize) -> Vec<SuspiciousActivity> {
        self.telemetry.suspicious_activities(n)
    }

    pub fn device_bandwidth(&self, mac: &MacAddr) -> Option<DeviceBandwidth> {
        self.bandwidth.device_bandwidth(mac)
    }

    pub fn top_consumers(&self, n: usize) -> Vec<DeviceBandwidth> {
        self.bandwidth.top_consumers(n)
    }

    pub fn network_summary(&self) -> NetworkSummary {
        self.bandwidth.network_summary()
    }

    pub fn detector_failures(&self) -> Vec<DetectorFailures> {
        self.detectors.failure_counts()
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            health: self.network_health(),
            summary: self.network_summary(),
            dispatcher: self.dispatcher_stats(),
            detector_failures: self.detector_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use metrics_exporter_prometheus::PrometheusBuilder;

    use lanshield_alert_dispatcher::DispatchOutcome::Accepted;
    use lanshield_core::metrics as m;
    use lanshield_core::types::{AlertType, Protocol};

    use super::*;

    fn monitor() -> Monitor {
        Monitor::new(&LanshieldConfig::default(), Collaborators::default()).unwrap()
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, last])
    }

    fn tcp(dst_port: u16) -> PacketEvent {
        tcp_sized(dst_port, 60)
    }

    fn tcp_sized(dst_port: u16, size: usize) -> PacketEvent {
        let mut b = PacketEvent::builder(mac(5), mac(1), size);
        b.protocol(Protocol::Tcp)
            .addresses("192.168.1.5".parse().unwrap(), "192.168.1.1".parse().unwrap())
            .ports(40_000, dst_port);
        b.build()
    }

    #[tokio::test]
    async fn processed_packets_are_counted_once() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let monitor = monitor();
        monitor.process_packet(tcp(443)).await;
        monitor.process_packet(tcp(443)).await;

        let rendered = handle.render();
        let prefix = format!("{} ", m::DETECTOR_PACKETS_PROCESSED_TOTAL);
        let line = rendered
            .lines()
            .find(|line| line.starts_with(&prefix))
            .unwrap();
        assert_eq!(line, format!("{prefix}2"));
    }

    #[tokio::test]
    async fn quota_warning_does_not_block_exceeded_alert() {
        let mut config = LanshieldConfig::default();
        config.bandwidth.daily_quota_bytes = 1_000;
        config.detection.suspicious_ports.clear();
        let monitor = Monitor::new(&config, Collaborators::default()).unwrap();

        monitor.process_packet(tcp_sized(443, 950)).await;
        let first = monitor.evaluate_bandwidth(Utc::now());
        assert_eq!(first, vec![Accepted, Accepted]);

        monitor.process_packet(tcp_sized(443, 100)).await;
        let second = monitor.evaluate_bandwidth(Utc::now());
        assert_eq!(second, vec![Accepted, Accepted]);

        let titles: Vec<_> = monitor
            .recent_notifications(10)
            .into_iter()
            .map(|a| (a.alert_type, a.title))
            .collect();
        assert!(titles.contains(&(AlertType::QuotaWarning, "Daily quota almost reached".to_owned())));
        assert!(titles.contains(&(AlertType::QuotaExceeded, "Daily quota exceeded".to_owned())));
    }

    #[tokio::test]
    async fn port_scan_reports_full_burst_on_flush() {
        let monitor = monitor();
        let start = Utc::now();
        for i in 0..25u16 {
            let mut b = PacketEvent::builder(mac(9), mac(1), 60);
            b.protocol(Protocol::Tcp)
                .addresses("10.0.0.66".parse().unwrap(), "10.0.0.1".parse().unwrap())
                .ports(40_000, 8_000 + i)
                .timestamp(start + TimeDelta::milliseconds(i64::from(i) * 400));
            monitor.process_packet(b.build()).await;
        }
        assert!(
            monitor
                .recent_notifications(10)
                .iter()
                .all(|a| a.alert_type != AlertType::PortScan)
        );

        monitor.flush(start + TimeDelta::seconds(10)).await;
        let scans: Vec<_> = monitor
            .recent_notifications(10)
            .into_iter()
            .filter(|a| a.alert_type == AlertType::PortScan)
            .collect();
        assert_eq!(scans.len(), 1);
        assert!(scans[0].message.contains("25"));
    }

    #[tokio::test]
    async fn suspicious_port_reaches_dispatcher() {
        let monitor = monitor();
        assert_eq!(monitor.process_packet(tcp(3389)).await, 1);
        assert_eq!(monitor.process_packet(tcp(3389)).await, 0);

        let recent = monitor.recent_notifications(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].alert_type, AlertType::SuspiciousPort);
        assert_eq!(monitor.top_talkers(1)[0].packets_sent, 2);
    }

    #[tokio::test]
    async fn malware_port_raises_both_alert_types() {
        let monitor = monitor();
        // 4444 is both a suspicious port and a known malware port
        assert_eq!(monitor.process_packet(tcp(4444)).await, 2);
        let types: Vec<_> = monitor
            .recent_notifications(10)
            .into_iter()
            .map(|a| a.alert_type)
            .collect();
        assert!(types.contains(&AlertType::MalwareCritical));
        assert!(types.contains(&AlertType::SuspiciousPort));
        assert_eq!(monitor.suspicious_activities(10).len(), 1);
    }

    #[tokio::test]
    async fn suspicious_reporting_can_be_disabled() {
        let mut config = LanshieldConfig::default();
        config.telemetry.report_suspicious = false;
        config.detection.suspicious_ports.clear();
        let monitor = Monitor::new(&config, Collaborators::default()).unwrap();

        assert_eq!(monitor.process_packet(tcp(31337)).await, 0);
        assert_eq!(monitor.suspicious_activities(10).len(), 1);
    }

    #[test]
    fn invalid_telemetry_config_fails_build() {
        let mut config = LanshieldConfig::default();
        config.telemetry.suspicious_capacity = 0;
        assert!(Monitor::new(&config, Collaborators::default()).is_err());
    }

    #[tokio::test]
    async fn status_report_serializes() {
        let monitor = monitor();
        monitor.process_packet(tcp(443)).await;
        let json = serde_json::to_value(monitor.status_report()).unwrap();
        assert_eq!(json["health"]["score"], 100);
        assert_eq!(json["summary"]["device_count"], 2);
        assert_eq!(json["dispatcher"]["total"], 0);
    }
}
