//! 포트 스캔 탐지
//!
//! 출발지 주소별로 윈도우 안에서 접근한 목적지 포트를 추적합니다.
//! 고유 포트 수가 임계값에 닿으면 그 윈도우의 알림을 예약하고,
//! 스캔이 잠잠해지면 (settle 간격 동안 새 패킷 없음) 최종 고유 포트 수로 알림을 냅니다.
//! 스캔이 계속되더라도 예약 후 윈도우 길이가 지나면 확정합니다.
//!
//! 확정 시점은 두 가지입니다.
//! - 같은 출발지의 다음 패킷이 잠잠한 간격 뒤에 도착할 때 ([`PacketDetector::inspect`])
//! - 주기 점검이나 종료 시 [`PacketDetector::release_pending`]을 부를 때
//!
//! "이미 알림" 판단은 트래커 잠금 안에서 test-and-set으로 끝내고,
//! 외부 저장소의 활성 알림 확인은 잠금을 푼 뒤 수행합니다.
//! 외부 확인은 best-effort이며 실패해도 알림은 그대로 나갑니다.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use lanshield_core::collab::{AlertStore, NoopAlertStore};
use lanshield_core::config::DetectionConfig;
use lanshield_core::error::DetectionError;
use lanshield_core::event::PacketEvent;
use lanshield_core::pipeline::BoxFuture;
use lanshield_core::types::{Alert, AlertType, MacAddr, Severity};

use super::{PacketDetector, seconds, shared_tracker};

/// 임계값을 넘었지만 아직 내보내지 않은 스캔
#[derive(Debug, Clone)]
struct HeldScan {
    crossed_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    /// 예약 이후 관측한 최대 고유 포트 수
    distinct: usize,
    src_mac: MacAddr,
    dst_ip: Option<IpAddr>,
}

impl HeldScan {
    fn is_due(&self, now: DateTime<Utc>, settle: TimeDelta, hold: TimeDelta) -> bool {
        now - self.last_seen >= settle || now - self.crossed_at >= hold
    }
}

#[derive(Debug, Default)]
struct ScanTracker {
    /// (포트, 마지막 접근 시각), 시각 오름차순
    ports: VecDeque<(u16, DateTime<Utc>)>,
    alerted_at: Option<DateTime<Utc>>,
    held: Option<HeldScan>,
}

impl ScanTracker {
    fn evict_before(&mut self, cutoff: DateTime<Utc>) {
        self.ports.retain(|(_, seen)| *seen >= cutoff);
    }

    fn touch(&mut self, port: u16, at: DateTime<Utc>) {
        self.ports.retain(|(p, _)| *p != port);
        // 순서가 뒤바뀐 패킷도 정렬을 유지
        let pos = self.ports.partition_point(|(_, seen)| *seen <= at);
        self.ports.insert(pos, (port, at));
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        let last_port = self.ports.back().map(|(_, seen)| *seen);
        last_port.max(self.alerted_at)
    }
}

/// 포트 스캔 탐지기
pub struct PortScanDetector {
    trackers: DashMap<IpAddr, Arc<Mutex<ScanTracker>>>,
    threshold: usize,
    window: TimeDelta,
    settle: TimeDelta,
    store: Arc<dyn AlertStore>,
}

impl PortScanDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            trackers: DashMap::new(),
            threshold: config.port_scan_threshold,
            window: seconds(config.port_scan_window_secs),
            settle: seconds(config.port_scan_settle_secs),
            store: Arc::new(NoopAlertStore),
        }
    }

    /// "이미 활성" 확인에 사용할 저장소
    pub fn with_store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.store = store;
        self
    }

    /// 잠금 안에서 창을 갱신합니다.
    ///
    /// 이번 패킷 이전에 잠잠해진 예약 스캔이 있으면 꺼내서 돌려줍니다.
    fn observe(&self, source: IpAddr, port: u16, event: &PacketEvent) -> Option<HeldScan> {
        let now = event.timestamp;
        let tracker = shared_tracker(&self.trackers, source, ScanTracker::default);
        let mut guard = tracker.lock();
        let tracker = &mut *guard;

        let released = tracker
            .held
            .take_if(|held| held.is_due(now, self.settle, self.window));

        let cutoff = now - self.window;
        tracker.evict_before(cutoff);
        tracker.touch(port, now);
        if tracker.alerted_at.is_some_and(|at| at < cutoff) {
            tracker.alerted_at = None;
        }

        let distinct = tracker.ports.len();
        if let Some(held) = tracker.held.as_mut() {
            held.distinct = held.distinct.max(distinct);
            held.last_seen = held.last_seen.max(now);
        } else if distinct >= self.threshold && tracker.alerted_at.is_none() {
            tracker.alerted_at = Some(now);
            tracker.held = Some(HeldScan {
                crossed_at: now,
                last_seen: now,
                distinct,
                src_mac: event.src_mac,
                dst_ip: event.dst_ip,
            });
        }
        released
    }

    async fn evaluate(&self, event: &PacketEvent) -> Result<Option<Alert>, DetectionError> {
        let (Some(source), Some(port)) = (event.src_ip, event.dst_port) else {
            return Ok(None);
        };
        let Some(scan) = self.observe(source, port, event) else {
            return Ok(None);
        };
        Ok(self.finalize(source, scan).await)
    }

    /// 예약된 스캔을 알림으로 확정합니다. 저장소에 이미 활성이면 버립니다.
    async fn finalize(&self, source: IpAddr, scan: HeldScan) -> Option<Alert> {
        match self
            .store
            .has_active_alert(AlertType::PortScan, source.to_string())
            .await
        {
            Ok(true) => {
                debug!(source = %source, "port scan already active in alert store");
                return None;
            }
            Ok(false) => {}
            Err(e) => warn!(source = %source, error = %e, "active alert check failed"),
        }

        let window_secs = self.window.num_seconds();
        let alert = Alert::new(
            AlertType::PortScan,
            Severity::High,
            format!("Port scan detected from {source}"),
            format!(
                "{} distinct ports probed within {window_secs}s (threshold {})",
                scan.distinct, self.threshold
            ),
        )
        .with_source_mac(scan.src_mac)
        .with_source_ip(Some(source))
        .with_destination_ip(scan.dst_ip)
        .with_created_at(scan.crossed_at);
        Some(alert)
    }

    async fn release(&self, now: DateTime<Utc>, force: bool) -> Vec<Alert> {
        let trackers: Vec<_> = self
            .trackers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut alerts = Vec::new();
        for (source, tracker) in trackers {
            let released = tracker
                .lock()
                .held
                .take_if(|held| force || held.is_due(now, self.settle, self.window));
            if let Some(scan) = released
                && let Some(alert) = self.finalize(source, scan).await
            {
                alerts.push(alert);
            }
        }
        alerts
    }
}

impl PacketDetector for PortScanDetector {
    fn name(&self) -> &'static str {
        "port_scan"
    }

    fn inspect<'a>(
        &'a self,
        event: &'a PacketEvent,
    ) -> BoxFuture<'a, Result<Option<Alert>, DetectionError>> {
        Box::pin(self.evaluate(event))
    }

    fn release_pending(&self, now: DateTime<Utc>, force: bool) -> BoxFuture<'_, Vec<Alert>> {
        Box::pin(self.release(now, force))
    }

    fn cleanup_stale(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.trackers.retain(|_, tracker| match tracker.try_lock() {
            Some(t) => t.held.is_some() || t.last_activity().is_some_and(|last| last >= cutoff),
            // 사용 중인 트래커는 다음 정리 때 다시 확인
            None => true,
        });
    }

    fn tracked_entries(&self) -> usize {
        self.trackers.len()
    }
}
