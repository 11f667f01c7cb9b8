//! 장치별 대역폭 집계
//!
//! 하드웨어 주소마다 트래커를 두고 누적 카운터(원자값)와
//! 분(60개)·시(24개)·일(30개) 버킷을 유지합니다. 보존 범위를 벗어난 버킷은
//! 쓰기 시점에 정리됩니다.
//!
//! # 속도 계산
//! 초당 대역폭은 마지막으로 완료된 분 버킷의 바이트 / 60 입니다.
//! 진행 중인 분은 포함하지 않으므로 값은 최대 1분 늦습니다.
//!
//! # 동시성
//! 트래커 단위 갱신은 트래커의 `Mutex`로 직렬화됩니다. 요약·상위 N 조회는
//! 트래커 `Arc` 목록을 먼저 복사한 뒤 하나씩 읽으므로 전역 잠금이 없고,
//! 트래커 간 일관성은 보장하지 않습니다.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use lanshield_core::config::BandwidthConfig;
use lanshield_core::event::PacketEvent;
use lanshield_core::metrics as m;
use lanshield_core::types::{Alert, AlertType, MacAddr, Severity};

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;

const MINUTE_RETENTION: i64 = 60;
const HOUR_RETENTION: i64 = 24;
const DAY_RETENTION: i64 = 30;

/// 쿨다운 엔트리 보존 기간 (초)
const COOLDOWN_RETENTION_SECS: u64 = 3_600;

/// 시간 창 상한 (약 100년)
const MAX_SPAN_SECS: u64 = 100 * 365 * 86_400;

fn span(secs: u64) -> TimeDelta {
    TimeDelta::seconds(secs.min(MAX_SPAN_SECS) as i64)
}

// ─── 버킷 ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Bucket {
    bytes_in: u64,
    bytes_out: u64,
    packets_in: u64,
    packets_out: u64,
}

impl Bucket {
    fn add(&mut self, bytes: u64, inbound: bool) {
        if inbound {
            self.bytes_in = self.bytes_in.saturating_add(bytes);
            self.packets_in += 1;
        } else {
            self.bytes_out = self.bytes_out.saturating_add(bytes);
            self.packets_out += 1;
        }
    }

    fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

/// 잘린 타임스탬프(슬롯 번호)를 키로 하는 버킷 시계열
#[derive(Debug)]
struct BucketSeries {
    slot_secs: i64,
    retention: i64,
    slots: BTreeMap<i64, Bucket>,
}

impl BucketSeries {
    fn new(slot_secs: i64, retention: i64) -> Self {
        Self {
            slot_secs,
            retention,
            slots: BTreeMap::new(),
        }
    }

    fn slot_of(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.slot_secs)
    }

    fn record(&mut self, at: DateTime<Utc>, bytes: u64, inbound: bool) {
        let slot = self.slot_of(at);
        self.slots.entry(slot).or_default().add(bytes, inbound);

        let newest = self.slots.keys().next_back().copied().unwrap_or(slot);
        let oldest_kept = newest - self.retention + 1;
        self.slots.retain(|&k, _| k >= oldest_kept);
    }

    fn get(&self, slot: i64) -> Bucket {
        self.slots.get(&slot).copied().unwrap_or_default()
    }

    fn sum_bytes(&self, from: i64, to: i64) -> u64 {
        self.slots
            .range(from..=to)
            .map(|(_, b)| b.total_bytes())
            .fold(0u64, u64::saturating_add)
    }
}

// ─── 장치 트래커 ───────────────────────────────────────────────────

#[derive(Debug)]
struct DeviceState {
    ip: Option<IpAddr>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    minutes: BucketSeries,
    hours: BucketSeries,
    days: BucketSeries,
}

#[derive(Debug)]
struct DeviceTracker {
    mac: MacAddr,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    packets_in: AtomicU64,
    packets_out: AtomicU64,
    state: Mutex<DeviceState>,
}

impl DeviceTracker {
    fn new(mac: MacAddr, at: DateTime<Utc>) -> Self {
        Self {
            mac,
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            packets_in: AtomicU64::new(0),
            packets_out: AtomicU64::new(0),
            state: Mutex::new(DeviceState {
                ip: None,
                first_seen: at,
                last_seen: at,
                minutes: BucketSeries::new(SECS_PER_MINUTE, MINUTE_RETENTION),
                hours: BucketSeries::new(SECS_PER_HOUR, HOUR_RETENTION),
                days: BucketSeries::new(SECS_PER_DAY, DAY_RETENTION),
            }),
        }
    }

    fn record(&self, ip: Option<IpAddr>, bytes: u64, inbound: bool, at: DateTime<Utc>) {
        if inbound {
            self.bytes_in.fetch_add(bytes, Ordering::Relaxed);
            self.packets_in.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bytes_out.fetch_add(bytes, Ordering::Relaxed);
            self.packets_out.fetch_add(1, Ordering::Relaxed);
        }

        let mut state = self.state.lock();
        if ip.is_some() {
            state.ip = ip;
        }
        state.first_seen = state.first_seen.min(at);
        state.last_seen = state.last_seen.max(at);
        state.minutes.record(at, bytes, inbound);
        state.hours.record(at, bytes, inbound);
        state.days.record(at, bytes, inbound);
    }

    fn compute_stats(&self, now: DateTime<Utc>) -> DeviceBandwidth {
        let state = self.state.lock();
        let minute = state.minutes.slot_of(now);
        let completed = state.minutes.get(minute - 1);
        DeviceBandwidth {
            mac: self.mac,
            ip: state.ip,
            total_bytes_in: self.bytes_in.load(Ordering::Relaxed),
            total_bytes_out: self.bytes_out.load(Ordering::Relaxed),
            total_packets_in: self.packets_in.load(Ordering::Relaxed),
            total_packets_out: self.packets_out.load(Ordering::Relaxed),
            bytes_per_sec_in: completed.bytes_in as f64 / SECS_PER_MINUTE as f64,
            bytes_per_sec_out: completed.bytes_out as f64 / SECS_PER_MINUTE as f64,
            bytes_last_hour: state.minutes.sum_bytes(minute - (MINUTE_RETENTION - 1), minute),
            bytes_today: state.days.get(state.days.slot_of(now)).total_bytes(),
            first_seen: state.first_seen,
            last_seen: state.last_seen,
        }
    }

    fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.state.try_lock().map(|s| s.last_seen)
    }
}

// ─── 조회 결과 ─────────────────────────────────────────────────────

/// 장치 대역폭 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceBandwidth {
    pub mac: MacAddr,
    pub ip: Option<IpAddr>,
    pub total_bytes_in: u64,
    pub total_bytes_out: u64,
    pub total_packets_in: u64,
    pub total_packets_out: u64,
    /// 직전 완료된 분의 수신 바이트 / 60
    pub bytes_per_sec_in: f64,
    /// 직전 완료된 분의 송신 바이트 / 60
    pub bytes_per_sec_out: f64,
    /// 최근 60분 버킷 합
    pub bytes_last_hour: u64,
    /// 오늘(UTC) 일 버킷
    pub bytes_today: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceBandwidth {
    pub fn bytes_per_sec(&self) -> f64 {
        self.bytes_per_sec_in + self.bytes_per_sec_out
    }
}

/// 네트워크 전체 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub device_count: usize,
    pub active_devices: usize,
    pub total_bytes_in: u64,
    pub total_bytes_out: u64,
    pub bytes_per_sec: f64,
    pub bytes_today: u64,
}

// ─── 집계기 ────────────────────────────────────────────────────────

/// 장치별 대역폭 집계기
pub struct BandwidthAggregator {
    config: BandwidthConfig,
    devices: DashMap<MacAddr, Arc<DeviceTracker>>,
    /// (장치, 알림 제목) → 마지막 알림 시각
    cooldowns: DashMap<(MacAddr, String), DateTime<Utc>>,
}

impl BandwidthAggregator {
    pub fn new(config: BandwidthConfig) -> Self {
        Self {
            config,
            devices: DashMap::new(),
            cooldowns: DashMap::new(),
        }
    }

    /// 현재 시각으로 트래픽을 기록합니다.
    pub fn record_traffic(&self, mac: MacAddr, ip: Option<IpAddr>, bytes: u64, inbound: bool) {
        self.record_traffic_at(mac, ip, bytes, inbound, Utc::now());
    }

    /// 지정한 시각으로 트래픽을 기록합니다.
    pub fn record_traffic_at(
        &self,
        mac: MacAddr,
        ip: Option<IpAddr>,
        bytes: u64,
        inbound: bool,
        at: DateTime<Utc>,
    ) {
        let tracker = Arc::clone(
            self.devices
                .entry(mac)
                .or_insert_with(|| Arc::new(DeviceTracker::new(mac, at)))
                .value(),
        );
        tracker.record(ip, bytes, inbound, at);
    }

    /// 패킷 하나를 출발지 송신, 목적지 수신으로 기록합니다.
    ///
    /// 0, 브로드캐스트, 멀티캐스트 하드웨어 주소는 장치로 취급하지 않습니다.
    pub fn record_packet(&self, event: &PacketEvent) {
        let bytes = event.size as u64;
        if is_device_address(&event.src_mac) {
            self.record_traffic_at(event.src_mac, event.src_ip, bytes, false, event.timestamp);
        }
        if is_device_address(&event.dst_mac) {
            self.record_traffic_at(event.dst_mac, event.dst_ip, bytes, true, event.timestamp);
        }
    }

    pub fn device_bandwidth(&self, mac: &MacAddr) -> Option<DeviceBandwidth> {
        self.device_bandwidth_at(mac, Utc::now())
    }

    pub fn device_bandwidth_at(&self, mac: &MacAddr, now: DateTime<Utc>) -> Option<DeviceBandwidth> {
        let tracker = self.devices.get(mac).map(|e| Arc::clone(e.value()))?;
        Some(tracker.compute_stats(now))
    }

    /// 오늘 사용량 기준 상위 N개 장치
    pub fn top_consumers(&self, n: usize) -> Vec<DeviceBandwidth> {
        self.top_consumers_at(n, Utc::now())
    }

    pub fn top_consumers_at(&self, n: usize, now: DateTime<Utc>) -> Vec<DeviceBandwidth> {
        let mut all: Vec<_> = self
            .snapshot_trackers()
            .iter()
            .map(|t| t.compute_stats(now))
            .collect();
        all.sort_by(|a, b| {
            b.bytes_today.cmp(&a.bytes_today).then_with(|| {
                (b.total_bytes_in + b.total_bytes_out).cmp(&(a.total_bytes_in + a.total_bytes_out))
            })
        });
        all.truncate(n);
        all
    }

    pub fn network_summary(&self) -> NetworkSummary {
        self.network_summary_at(Utc::now())
    }

    pub fn network_summary_at(&self, now: DateTime<Utc>) -> NetworkSummary {
        let active_cutoff = now - span(self.config.active_window_secs);
        let mut summary = NetworkSummary::default();
        for tracker in self.snapshot_trackers() {
            let stats = tracker.compute_stats(now);
            summary.device_count += 1;
            if stats.last_seen >= active_cutoff {
                summary.active_devices += 1;
            }
            summary.total_bytes_in = summary.total_bytes_in.saturating_add(stats.total_bytes_in);
            summary.total_bytes_out = summary.total_bytes_out.saturating_add(stats.total_bytes_out);
            summary.bytes_per_sec += stats.bytes_per_sec();
            summary.bytes_today = summary.bytes_today.saturating_add(stats.bytes_today);
        }
        summary
    }

    /// 활성 장치의 대역폭 임계값과 일일 할당량을 평가합니다.
    ///
    /// 같은 (장치, 제목) 알림은 `alert_cooldown_secs` 안에 다시 나가지 않습니다.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let active_cutoff = now - span(self.config.active_window_secs);
        let mut alerts = Vec::new();

        for tracker in self.snapshot_trackers() {
            let stats = tracker.compute_stats(now);
            if stats.last_seen < active_cutoff {
                continue;
            }
            for alert in self.candidate_alerts(&stats, now) {
                if self.claim_cooldown(stats.mac, &alert.title, now) {
                    alerts.push(alert);
                }
            }
        }

        metrics::gauge!(m::BANDWIDTH_TRACKED_DEVICES).set(self.devices.len() as f64);
        if !alerts.is_empty() {
            debug!(count = alerts.len(), "bandwidth evaluation produced alerts");
        }
        alerts
    }

    fn candidate_alerts(&self, stats: &DeviceBandwidth, now: DateTime<Utc>) -> Vec<Alert> {
        let mut found = Vec::new();
        let rate = stats.bytes_per_sec();
        if rate > self.config.threshold_bytes_per_sec as f64 {
            found.push(
                Alert::new(
                    AlertType::BandwidthThreshold,
                    Severity::Medium,
                    "Bandwidth threshold exceeded",
                    format!(
                        "{} is using {:.1} Mbps (threshold {:.1} Mbps)",
                        stats.mac,
                        rate * 8.0 / 1_000_000.0,
                        self.config.threshold_bytes_per_sec as f64 * 8.0 / 1_000_000.0
                    ),
                )
                .with_source_mac(stats.mac)
                .with_source_ip(stats.ip)
                .with_created_at(now),
            );
        }

        let quota = self.config.daily_quota_bytes;
        if quota > 0 {
            let used = u128::from(stats.bytes_today);
            let warn_at = u128::from(quota) * u128::from(self.config.quota_warning_percent);
            if used * 100 >= warn_at {
                let exceeded = used >= u128::from(quota);
                let (alert_type, title, severity) = if exceeded {
                    (AlertType::QuotaExceeded, "Daily quota exceeded", Severity::High)
                } else {
                    (AlertType::QuotaWarning, "Daily quota almost reached", Severity::Medium)
                };
                let percent = used * 100 / u128::from(quota);
                found.push(
                    Alert::new(
                        alert_type,
                        severity,
                        title,
                        format!(
                            "{} used {} of {} bytes today ({percent}%)",
                            stats.mac, stats.bytes_today, quota
                        ),
                    )
                    .with_source_mac(stats.mac)
                    .with_source_ip(stats.ip)
                    .with_created_at(now),
                );
            }
        }
        found
    }

    fn claim_cooldown(&self, mac: MacAddr, title: &str, now: DateTime<Utc>) -> bool {
        let cooldown = span(self.config.alert_cooldown_secs);
        match self.cooldowns.entry((mac, title.to_owned())) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < cooldown {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// 오래 비활성인 장치와 오래된 쿨다운을 정리합니다.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        let inactive = span(self.config.inactive_device_days.saturating_mul(86_400));
        let before = self.devices.len();
        self.devices.retain(|_, tracker| match tracker.last_seen() {
            Some(last_seen) => now - last_seen <= inactive,
            None => true,
        });
        let retention = span(COOLDOWN_RETENTION_SECS);
        self.cooldowns.retain(|_, at| now - *at <= retention);

        let removed = before.saturating_sub(self.devices.len());
        if removed > 0 {
            debug!(removed, "evicted inactive bandwidth trackers");
        }
        metrics::gauge!(m::BANDWIDTH_TRACKED_DEVICES).set(self.devices.len() as f64);
    }

    pub fn tracked_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn active_cooldowns(&self) -> usize {
        self.cooldowns.len()
    }

    fn snapshot_trackers(&self) -> Vec<Arc<DeviceTracker>> {
        self.devices.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

fn is_device_address(mac: &MacAddr) -> bool {
    !mac.is_zero() && mac.octets()[0] & 0x01 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0xaa, 0xbb, 0xcc, 0x00, 0x00, last])
    }

    /// 분 경계에 맞춘 기준 시각
    fn minute_start() -> DateTime<Utc> {
        DateTime::from_timestamp(28_333_333 * 60, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Utc> {
        minute_start() + TimeDelta::seconds(n)
    }

    fn aggregator() -> BandwidthAggregator {
        BandwidthAggregator::new(BandwidthConfig::default())
    }

    #[test]
    fn completed_minute_drives_rate() {
        let agg = aggregator();
        for s in 0..10 {
            agg.record_traffic_at(mac(1), None, 1_000_000, true, secs(s));
        }

        // 분이 끝나기 전에는 완료된 버킷이 없음
        let during = agg.device_bandwidth_at(&mac(1), secs(30)).unwrap();
        assert_eq!(during.bytes_per_sec_in, 0.0);

        let after = agg.device_bandwidth_at(&mac(1), secs(61)).unwrap();
        assert_eq!(after.bytes_per_sec_in, 10_000_000.0 / 60.0);
        assert_eq!(after.total_bytes_in, 10_000_000);
        assert_eq!(after.total_packets_in, 10);
        assert_eq!(after.bytes_last_hour, 10_000_000);
    }

    #[test]
    fn minute_buckets_are_bounded() {
        let agg = aggregator();
        for minute in 0..200 {
            agg.record_traffic_at(mac(1), None, 10, false, secs(minute * 60));
        }
        let tracker = agg.devices.get(&mac(1)).map(|e| Arc::clone(e.value())).unwrap();
        let state = tracker.state.lock();
        assert_eq!(state.minutes.slots.len(), MINUTE_RETENTION as usize);
        assert!(state.hours.slots.len() <= HOUR_RETENTION as usize);
    }

    #[test]
    fn record_packet_splits_direction() {
        let agg = aggregator();
        let mut b = PacketEvent::builder(mac(1), mac(2), 1500);
        b.timestamp(secs(0));
        agg.record_packet(&b.build());

        let mut b = PacketEvent::builder(mac(1), MacAddr::BROADCAST, 60);
        b.timestamp(secs(1));
        agg.record_packet(&b.build());

        let sender = agg.device_bandwidth_at(&mac(1), secs(2)).unwrap();
        assert_eq!(sender.total_bytes_out, 1560);
        let receiver = agg.device_bandwidth_at(&mac(2), secs(2)).unwrap();
        assert_eq!(receiver.total_bytes_in, 1500);
        assert_eq!(agg.tracked_devices(), 2);
    }

    #[test]
    fn threshold_alert_respects_cooldown() {
        let agg = BandwidthAggregator::new(BandwidthConfig {
            threshold_bytes_per_sec: 1_000,
            ..BandwidthConfig::default()
        });
        agg.record_traffic_at(mac(1), None, 6_000_000, false, secs(0));
        agg.record_traffic_at(mac(1), None, 10, false, secs(70));

        let alerts = agg.evaluate(secs(75));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::BandwidthThreshold);
        assert!(agg.evaluate(secs(80)).is_empty());
    }

    #[test]
    fn inactive_devices_are_not_evaluated() {
        let agg = BandwidthAggregator::new(BandwidthConfig {
            threshold_bytes_per_sec: 1,
            ..BandwidthConfig::default()
        });
        agg.record_traffic_at(mac(1), None, 1_000_000, false, secs(0));
        assert!(agg.evaluate(secs(3_600)).is_empty());
    }

    #[test]
    fn quota_warning_then_exceeded() {
        let agg = BandwidthAggregator::new(BandwidthConfig {
            daily_quota_bytes: 1_000,
            quota_warning_percent: 90,
            ..BandwidthConfig::default()
        });
        agg.record_traffic_at(mac(1), None, 950, true, secs(0));
        let alerts = agg.evaluate(secs(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Daily quota almost reached");
        assert_eq!(alerts[0].alert_type, AlertType::QuotaWarning);

        agg.record_traffic_at(mac(1), None, 100, true, secs(2));
        let alerts = agg.evaluate(secs(3));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Daily quota exceeded");
        assert_eq!(alerts[0].alert_type, AlertType::QuotaExceeded);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[test]
    fn summary_and_top_consumers() {
        let agg = aggregator();
        agg.record_traffic_at(mac(1), None, 100, true, secs(0));
        agg.record_traffic_at(mac(2), None, 500, false, secs(0));
        agg.record_traffic_at(mac(3), None, 300, true, secs(0));

        let top = agg.top_consumers_at(2, secs(1));
        assert_eq!(top.iter().map(|d| d.mac).collect::<Vec<_>>(), vec![mac(2), mac(3)]);

        let summary = agg.network_summary_at(secs(1));
        assert_eq!(summary.device_count, 3);
        assert_eq!(summary.active_devices, 3);
        assert_eq!(summary.total_bytes_in, 400);
        assert_eq!(summary.total_bytes_out, 500);
        assert_eq!(summary.bytes_today, 900);
    }

    #[test]
    fn cleanup_evicts_inactive_devices_and_old_cooldowns() {
        let agg = BandwidthAggregator::new(BandwidthConfig {
            threshold_bytes_per_sec: 1,
            ..BandwidthConfig::default()
        });
        agg.record_traffic_at(mac(1), None, 6_000, false, secs(0));
        agg.record_traffic_at(mac(1), None, 1, false, secs(61));
        assert_eq!(agg.evaluate(secs(62)).len(), 1);
        assert_eq!(agg.active_cooldowns(), 1);

        agg.cleanup(secs(62) + TimeDelta::hours(2));
        assert_eq!(agg.active_cooldowns(), 0);
        assert_eq!(agg.tracked_devices(), 1);

        agg.cleanup(secs(0) + TimeDelta::days(8));
        assert_eq!(agg.tracked_devices(), 0);
    }

    #[test]
    fn stats_serialize_to_json() {
        let agg = aggregator();
        agg.record_traffic_at(mac(1), "10.0.0.2".parse().ok(), 10, true, secs(0));
        let json = serde_json::to_value(agg.device_bandwidth_at(&mac(1), secs(1))).unwrap();
        assert_eq!(json["mac"], "AA:BB:CC:00:00:01");
        assert_eq!(json["ip"], "10.0.0.2");
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// 한 시간 안에 기록한 바이트 합은 분 버킷 합과 같다
            #[test]
            fn minute_buckets_conserve_bytes(
                writes in proptest::collection::vec((0i64..3_600, 0u64..1_000_000, any::<bool>()), 1..200)
            ) {
                let agg = aggregator();
                let mut expected = 0u64;
                for (offset, bytes, inbound) in &writes {
                    agg.record_traffic_at(mac(9), None, *bytes, *inbound, secs(*offset));
                    expected += bytes;
                }
                let stats = agg.device_bandwidth_at(&mac(9), secs(3_599)).unwrap();
                prop_assert_eq!(stats.bytes_last_hour, expected);
                prop_assert_eq!(stats.total_bytes_in + stats.total_bytes_out, expected);
            }
        }
    }
}
