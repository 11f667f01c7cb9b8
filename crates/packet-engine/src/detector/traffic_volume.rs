//! 트래픽 폭주 탐지
//!
//! 출발지 하드웨어 주소별로 10초 창에 바이트/패킷을 누적합니다.
//! 창이 끝난 뒤 첫 패킷에서 실제 경과 시간으로 초당 속도를 계산하고,
//! 임계값 초과이면서 마지막 알림 후 알림 간격이 지났으면 Medium 알림을 냅니다.
//! 창은 알림 여부와 관계없이 항상 새로 시작합니다.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use lanshield_core::config::DetectionConfig;
use lanshield_core::error::DetectionError;
use lanshield_core::event::PacketEvent;
use lanshield_core::pipeline::BoxFuture;
use lanshield_core::types::{Alert, AlertType, MacAddr, Severity};

use super::{PacketDetector, seconds, shared_tracker};

#[derive(Debug)]
struct VolumeTracker {
    window_start: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    bytes: u64,
    packets: u64,
    last_alert: Option<DateTime<Utc>>,
}

impl VolumeTracker {
    fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            window_start: at,
            last_seen: at,
            bytes: 0,
            packets: 0,
            last_alert: None,
        }
    }
}

/// 창 종료 시 계산된 속도
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rates {
    bytes_per_sec: f64,
    packets_per_sec: f64,
}

/// 트래픽 폭주 탐지기
pub struct TrafficVolumeDetector {
    trackers: DashMap<MacAddr, Arc<Mutex<VolumeTracker>>>,
    window: TimeDelta,
    bytes_threshold: u64,
    packets_threshold: u64,
    alert_interval: TimeDelta,
}

impl TrafficVolumeDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            trackers: DashMap::new(),
            window: seconds(config.traffic_window_secs),
            bytes_threshold: config.traffic_bytes_per_sec_threshold,
            packets_threshold: config.traffic_packets_per_sec_threshold,
            alert_interval: seconds(config.traffic_alert_interval_secs),
        }
    }

    /// 패킷을 누적하고, 창이 넘어가면서 알림이 확정되면 속도를 돌려줍니다.
    fn observe(&self, mac: MacAddr, size: usize, now: DateTime<Utc>) -> Option<Rates> {
        let tracker = shared_tracker(&self.trackers, mac, || VolumeTracker::starting_at(now));
        let mut t = tracker.lock();

        let mut fired = None;
        if now - t.window_start >= self.window {
            let elapsed = (now - t.window_start).num_milliseconds() as f64 / 1000.0;
            let rates = Rates {
                bytes_per_sec: t.bytes as f64 / elapsed,
                packets_per_sec: t.packets as f64 / elapsed,
            };
            let exceeded = rates.bytes_per_sec > self.bytes_threshold as f64
                || rates.packets_per_sec > self.packets_threshold as f64;
            let interval_passed = t
                .last_alert
                .is_none_or(|last| now - last >= self.alert_interval);
            if exceeded && interval_passed {
                t.last_alert = Some(now);
                fired = Some(rates);
            }
            t.window_start = now;
            t.bytes = 0;
            t.packets = 0;
        }

        t.bytes = t.bytes.saturating_add(size as u64);
        t.packets += 1;
        t.last_seen = t.last_seen.max(now);
        fired
    }

    fn evaluate(&self, event: &PacketEvent) -> Option<Alert> {
        let rates = self.observe(event.src_mac, event.size, event.timestamp)?;
        let mbps = rates.bytes_per_sec / (1024.0 * 1024.0);
        Some(
            Alert::new(
                AlertType::TrafficVolume,
                Severity::Medium,
                format!("High traffic volume from {}", event.src_mac),
                format!(
                    "{:.2} MB/s and {:.0} packets/s over the last {}s (thresholds {} B/s, {} pps)",
                    mbps,
                    rates.packets_per_sec,
                    self.window.num_seconds(),
                    self.bytes_threshold,
                    self.packets_threshold
                ),
            )
            .with_source_mac(event.src_mac)
            .with_source_ip(event.src_ip)
            .with_created_at(event.timestamp),
        )
    }
}

impl PacketDetector for TrafficVolumeDetector {
    fn name(&self) -> &'static str {
        "traffic_volume"
    }

    fn inspect<'a>(
        &'a self,
        event: &'a PacketEvent,
    ) -> BoxFuture<'a, Result<Option<Alert>, DetectionError>> {
        Box::pin(std::future::ready(Ok(self.evaluate(event))))
    }

    fn cleanup_stale(&self, now: DateTime<Utc>) {
        let idle = self.window.max(self.alert_interval);
        self.trackers.retain(|_, tracker| match tracker.try_lock() {
            Some(t) => now - t.last_seen < idle,
            None => true,
        });
    }

    fn tracked_entries(&self) -> usize {
        self.trackers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    const MB: usize = 1024 * 1024;

    fn detector() -> TrafficVolumeDetector {
        TrafficVolumeDetector::new(&DetectionConfig::default())
    }

    #[tokio::test]
    async fn burst_alerts_at_rollover() {
        let d = detector();
        for secs in 0..6 {
            let ev = sized(mac(1), 20 * MB, secs);
            assert!(d.inspect(&ev).await.unwrap().is_none());
        }
        // 120 MB / 10 s = 12 MB/s
        let alert = d.inspect(&sized(mac(1), 100, 10)).await.unwrap().unwrap();
        assert_eq!(alert.alert_type, AlertType::TrafficVolume);
        assert_eq!(alert.severity, Severity::Medium);
        assert!(alert.message.contains("12.00 MB/s"));
    }

    #[tokio::test]
    async fn packet_rate_alone_can_trigger() {
        let d = detector();
        for _ in 0..10_001 {
            d.inspect(&sized(mac(2), 60, 0)).await.unwrap();
        }
        assert!(d.inspect(&sized(mac(2), 60, 10)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn quiet_device_never_alerts() {
        let d = detector();
        for secs in 0..40 {
            assert!(d.inspect(&sized(mac(3), 1500, secs)).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn repeated_bursts_respect_alert_interval() {
        let d = detector();
        let mut fired = Vec::new();
        for window in 0..8i64 {
            let start = window * 10;
            for s in 0..6 {
                d.inspect(&sized(mac(4), 20 * MB, start + s)).await.unwrap();
            }
            if d.inspect(&sized(mac(4), 0, start + 10)).await.unwrap().is_some() {
                fired.push(start + 10);
            }
        }
        assert_eq!(fired, vec![10, 70]);
    }

    #[tokio::test]
    async fn cleanup_drops_idle_trackers() {
        let d = detector();
        d.inspect(&sized(mac(1), 100, 0)).await.unwrap();
        d.inspect(&sized(mac(2), 100, 100)).await.unwrap();
        d.cleanup_stale(at(120));
        assert_eq!(d.tracked_entries(), 1);
    }
}
