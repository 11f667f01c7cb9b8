//! 이상 탐지기: 패킷 단위 상태 기반 탐지
//!
//! 다섯 개의 독립 탐지기가 [`PacketDetector`]를 구현하며,
//! [`DetectorSet`]이 패킷마다 모든 탐지기를 병렬 태스크로 실행합니다.
//!
//! # 장애 격리
//! 한 탐지기의 에러나 패닉은 해당 탐지기·해당 패킷에서만 잡혀 로그로 남고,
//! 다른 탐지기와 집계기는 같은 패킷을 계속 처리합니다.
//!
//! # 아키텍처
//! ```text
//! Arc<PacketEvent> ──▶ DetectorSet ──JoinSet──┬── PortScanDetector
//!                                              ├── ArpSpoofDetector
//!                                              ├── SuspiciousPortDetector
//!                                              ├── TrafficVolumeDetector
//!                                              └── MalformedPacketDetector
//!                          │
//!                          └──▶ Vec<Alert> (장치 이름 보강 후 반환)
//! ```
//!
//! # 상태 관리
//! 트래커 맵은 `DashMap`이고, 긴 갱신이 필요한 트래커는 자기 `Mutex`를 가집니다.
//! 샤드 잠금은 트래커 `Arc`를 꺼내는 동안만 잡고, 트래커 잠금 중에는
//! 다른 트래커나 맵의 잠금을 잡지 않습니다.

mod arp_spoof;
mod malformed;
mod port_scan;
mod suspicious_port;
mod traffic_volume;

pub use arp_spoof::ArpSpoofDetector;
pub use malformed::MalformedPacketDetector;
pub use port_scan::PortScanDetector;
pub use suspicious_port::{SuspiciousPortDetector, service_name};
pub use traffic_volume::TrafficVolumeDetector;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error};

use lanshield_core::collab::{AlertStore, DeviceResolver, NoopDeviceResolver};
use lanshield_core::config::DetectionConfig;
use lanshield_core::error::DetectionError;
use lanshield_core::event::PacketEvent;
use lanshield_core::metrics as m;
use lanshield_core::pipeline::BoxFuture;
use lanshield_core::types::Alert;

/// 패킷 단위 탐지기
pub trait PacketDetector: Send + Sync {
    /// 탐지기 이름 (로그·메트릭 레이블)
    fn name(&self) -> &'static str;

    /// 패킷 하나를 검사합니다.
    fn inspect<'a>(
        &'a self,
        event: &'a PacketEvent,
    ) -> BoxFuture<'a, Result<Option<Alert>, DetectionError>>;

    /// 보류 중인 알림 중 확정할 때가 된 것을 내보냅니다.
    ///
    /// `force`면 간격과 상관없이 모두 내보냅니다 (종료 시 flush).
    fn release_pending(&self, _now: DateTime<Utc>, _force: bool) -> BoxFuture<'_, Vec<Alert>> {
        Box::pin(async { Vec::new() })
    }

    /// 만료된 내부 상태를 정리합니다.
    fn cleanup_stale(&self, _now: DateTime<Utc>) {}

    /// 현재 보유한 트래커/엔트리 수
    fn tracked_entries(&self) -> usize {
        0
    }
}

/// 트래커 맵에서 키의 트래커를 꺼내거나 새로 만듭니다.
///
/// 샤드 잠금은 함수 안에서 풀립니다.
pub(crate) fn shared_tracker<K, T>(
    map: &DashMap<K, Arc<Mutex<T>>>,
    key: K,
    init: impl FnOnce() -> T,
) -> Arc<Mutex<T>>
where
    K: Eq + Hash,
{
    Arc::clone(
        map.entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .value(),
    )
}

/// 시간 창 상한 (약 100년). 타임스탬프 연산이 넘치지 않도록 자릅니다.
const MAX_SPAN_SECS: u64 = 100 * 365 * 86_400;

/// 설정의 초 단위 값을 시간 간격으로 바꿉니다.
pub(crate) fn seconds(value: u64) -> TimeDelta {
    TimeDelta::seconds(value.min(MAX_SPAN_SECS) as i64)
}

/// 탐지기별 실패 횟수
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorFailures {
    pub detector: &'static str,
    pub failures: u64,
}

/// 탐지기 묶음. 패킷마다 모든 탐지기를 병렬로 실행합니다.
pub struct DetectorSet {
    detectors: Vec<Arc<dyn PacketDetector>>,
    failures: Vec<AtomicU64>,
    resolver: Arc<dyn DeviceResolver>,
}

impl DetectorSet {
    /// 빈 탐지기 묶음
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
            failures: Vec::new(),
            resolver: Arc::new(NoopDeviceResolver),
        }
    }

    /// 설정으로부터 기본 탐지기 다섯 개를 구성합니다.
    ///
    /// `store`는 포트 스캔의 "이미 활성" 확인에 사용됩니다.
    pub fn from_config(config: &DetectionConfig, store: Arc<dyn AlertStore>) -> Self {
        let mut set = Self::new();
        set.push(Arc::new(PortScanDetector::new(config).with_store(store)));
        set.push(Arc::new(ArpSpoofDetector::new(config)));
        set.push(Arc::new(SuspiciousPortDetector::new(config)));
        set.push(Arc::new(TrafficVolumeDetector::new(config)));
        set.push(Arc::new(MalformedPacketDetector::new()));
        set
    }

    /// 알림의 장치 정보 보강에 쓸 해석기를 지정합니다.
    pub fn with_resolver(mut self, resolver: Arc<dyn DeviceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// 탐지기를 추가합니다.
    pub fn push(&mut self, detector: Arc<dyn PacketDetector>) {
        self.detectors.push(detector);
        self.failures.push(AtomicU64::new(0));
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// 탐지기 이름 목록 (등록 순)
    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// 모든 탐지기를 병렬 태스크로 실행하고, 생성된 알림을 등록 순으로 돌려줍니다.
    ///
    /// 실패한 탐지기는 알림 없이 건너뜁니다.
    pub async fn inspect(&self, event: Arc<PacketEvent>) -> Vec<Alert> {
        metrics::counter!(m::DETECTOR_PACKETS_PROCESSED_TOTAL).increment(1);

        let mut tasks = JoinSet::new();
        let mut index_of = HashMap::with_capacity(self.detectors.len());
        for (index, detector) in self.detectors.iter().enumerate() {
            let detector = Arc::clone(detector);
            let event = Arc::clone(&event);
            let handle = tasks.spawn(async move { detector.inspect(&event).await });
            index_of.insert(handle.id(), index);
        }

        let mut produced: Vec<(usize, Alert)> = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, result)) => (id, result.map_err(|e| e.to_string())),
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        "detector panicked".to_owned()
                    } else {
                        join_err.to_string()
                    };
                    (join_err.id(), Err(reason))
                }
            };
            let Some(&index) = index_of.get(&id) else {
                continue;
            };
            let name = self.detectors[index].name();
            match outcome {
                Ok(Some(alert)) => {
                    debug!(detector = name, alert_type = %alert.alert_type, "detector produced alert");
                    metrics::counter!(m::DETECTOR_ALERTS_TOTAL, m::LABEL_DETECTOR => name)
                        .increment(1);
                    produced.push((index, alert));
                }
                Ok(None) => {}
                Err(reason) => {
                    self.failures[index].fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::DETECTOR_FAILURES_TOTAL, m::LABEL_DETECTOR => name)
                        .increment(1);
                    error!(detector = name, error = %reason, "detector failed on packet");
                }
            }
        }

        produced.sort_by_key(|(index, _)| *index);
        produced
            .into_iter()
            .map(|(_, alert)| self.enrich(alert))
            .collect()
    }

    /// 보류 알림을 탐지기 등록 순으로 모아 돌려줍니다.
    pub async fn release_pending(&self, now: DateTime<Utc>, force: bool) -> Vec<Alert> {
        let mut released = Vec::new();
        for detector in &self.detectors {
            let alerts = detector.release_pending(now, force).await;
            if alerts.is_empty() {
                continue;
            }
            let name = detector.name();
            debug!(detector = name, count = alerts.len(), "held alerts released");
            metrics::counter!(m::DETECTOR_ALERTS_TOTAL, m::LABEL_DETECTOR => name)
                .increment(alerts.len() as u64);
            released.extend(alerts.into_iter().map(|alert| self.enrich(alert)));
        }
        released
    }

    /// 모든 탐지기의 만료 상태를 정리합니다.
    pub fn cleanup_stale(&self, now: DateTime<Utc>) {
        for detector in &self.detectors {
            detector.cleanup_stale(now);
        }
    }

    /// 탐지기별 실패 횟수
    pub fn failure_counts(&self) -> Vec<DetectorFailures> {
        self.detectors
            .iter()
            .zip(&self.failures)
            .map(|(d, count)| DetectorFailures {
                detector: d.name(),
                failures: count.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// 탐지기별 보유 엔트리 수
    pub fn tracked_entries(&self) -> Vec<(&'static str, usize)> {
        self.detectors
            .iter()
            .map(|d| (d.name(), d.tracked_entries()))
            .collect()
    }

    fn enrich(&self, alert: Alert) -> Alert {
        let Some(mac) = alert.source_mac else {
            return alert;
        };
        match self.resolver.resolve(&mac) {
            Some(identity) => alert.with_device(Some(identity.id), identity.name),
            None => alert,
        }
    }
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::IpAddr;

    use chrono::{DateTime, Duration, Utc};

    use lanshield_core::event::PacketEvent;
    use lanshield_core::types::{MacAddr, Protocol};

    pub fn base_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        base_time() + Duration::seconds(secs)
    }

    pub fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, last])
    }

    pub fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    pub fn tcp(src_mac: MacAddr, src: &str, dst: &str, dst_port: u16, secs: i64) -> PacketEvent {
        let mut b = PacketEvent::builder(src_mac, mac(0xfe), 60);
        b.protocol(Protocol::Tcp)
            .addresses(ip(src), ip(dst))
            .ports(40_000, dst_port)
            .timestamp(at(secs));
        b.build()
    }

    pub fn sized(src_mac: MacAddr, size: usize, secs: i64) -> PacketEvent {
        let mut b = PacketEvent::builder(src_mac, mac(0xfe), size);
        b.protocol(Protocol::Udp)
            .addresses(ip("10.0.0.9"), ip("10.0.0.1"))
            .ports(5000, 5001)
            .timestamp(at(secs));
        b.build()
    }

    pub fn arp(src_mac: MacAddr, sender: &str, secs: i64) -> PacketEvent {
        let mut b = PacketEvent::builder(src_mac, MacAddr::BROADCAST, 42);
        b.protocol(Protocol::Arp)
            .addresses(ip(sender), ip("192.168.1.254"))
            .arp_operation(lanshield_core::event::ArpOperation::Reply)
            .timestamp(at(secs));
        b.build()
    }
}
