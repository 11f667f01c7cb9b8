//! 트래픽 텔레메트리: 연결 테이블, 프로토콜 분포, 상위 발신자, 의심 활동, 건강 점수
//!
//! 패킷마다 [`TrafficTelemetry::record_packet`]이 모든 테이블을 갱신하고
//! 의심 휴리스틱을 평가합니다. 실시간 속도는 [`TrafficTelemetry::tick`]마다
//! (지난 틱 이후 누적값 / 경과 초)로 다시 계산되며 누적값은 0으로 돌아갑니다.
//!
//! # 의심 휴리스틱
//! - 출발지 주소의 평판 조회 결과가 있음
//! - 목적지 포트가 알려진 악성코드 포트
//! - 한 출발지에서 1분 안에 `port_fanout_threshold`개를 넘는 목적지 포트

mod health;
mod suspicious;

pub use health::{HealthBand, NetworkHealth};
pub use suspicious::{ActivityLevel, SuspiciousActivity, malware_port_name};

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use lanshield_core::collab::{
    DeviceResolver, NoopDeviceResolver, NoopReputation, ReputationLookup,
};
use lanshield_core::config::TelemetryConfig;
use lanshield_core::event::PacketEvent;
use lanshield_core::metrics as m;
use lanshield_core::types::{MacAddr, Protocol, Severity};

use crate::error::TelemetryError;
use health::health_score;
use suspicious::{ActivityRing, FanoutTracker};

const SECS_PER_HOUR: i64 = 3_600;

// ─── 조회 결과 타입 ────────────────────────────────────────────────

/// 연결(흐름) 키
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FlowKey {
    pub src_mac: MacAddr,
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub dst_port: Option<u16>,
    pub protocol: Protocol,
}

/// 연결 테이블 항목
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    #[serde(flatten)]
    pub key: FlowKey,
    pub bytes: u64,
    pub packets: u64,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// 프로토콜별 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolStats {
    pub protocol: Protocol,
    pub packets: u64,
    pub bytes: u64,
    /// 전체 패킷 중 비율 (0~100)
    pub percentage: f64,
}

/// 시간대별 트래픽
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTraffic {
    pub hour_start: DateTime<Utc>,
    pub bytes: u64,
    pub packets: u64,
    pub unique_devices: usize,
}

/// 상위 발신자
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTalker {
    pub mac: MacAddr,
    pub ip: Option<IpAddr>,
    pub device_name: Option<String>,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub last_activity: DateTime<Utc>,
}

// ─── 내부 상태 ─────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
struct Counter {
    packets: u64,
    bytes: u64,
}

#[derive(Debug, Default)]
struct HourBucket {
    bytes: u64,
    packets: u64,
    devices: HashSet<MacAddr>,
}

#[derive(Debug, Clone)]
struct TalkerEntry {
    ip: Option<IpAddr>,
    bytes_sent: u64,
    packets_sent: u64,
    last_activity: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LiveRates {
    last_tick: Option<DateTime<Utc>>,
    packets_per_sec: f64,
    bytes_per_sec: f64,
}

/// 트래픽 텔레메트리 집계기
pub struct TrafficTelemetry {
    config: TelemetryConfig,
    reputation: Arc<dyn ReputationLookup>,
    resolver: Arc<dyn DeviceResolver>,
    connections: DashMap<FlowKey, ConnectionInfo>,
    protocols: DashMap<Protocol, Counter>,
    hourly: DashMap<i64, Arc<Mutex<HourBucket>>>,
    talkers: DashMap<MacAddr, Arc<Mutex<TalkerEntry>>>,
    fanout: DashMap<IpAddr, Arc<Mutex<FanoutTracker>>>,
    suspicious: ActivityRing,
    pending_packets: AtomicU64,
    pending_bytes: AtomicU64,
    rates: Mutex<LiveRates>,
}

impl TrafficTelemetry {
    /// 집계기를 생성합니다.
    ///
    /// # 에러
    /// `suspicious_capacity`나 `port_fanout_threshold`가 0이면
    /// [`TelemetryError::InvalidSetting`]을 반환합니다.
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        if config.suspicious_capacity == 0 {
            return Err(TelemetryError::InvalidSetting {
                field: "telemetry.suspicious_capacity",
                reason: "must be greater than 0".to_owned(),
            });
        }
        if config.port_fanout_threshold == 0 {
            return Err(TelemetryError::InvalidSetting {
                field: "telemetry.port_fanout_threshold",
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(Self {
            suspicious: ActivityRing::new(config.suspicious_capacity),
            config,
            reputation: Arc::new(NoopReputation),
            resolver: Arc::new(NoopDeviceResolver),
            connections: DashMap::new(),
            protocols: DashMap::new(),
            hourly: DashMap::new(),
            talkers: DashMap::new(),
            fanout: DashMap::new(),
            pending_packets: AtomicU64::new(0),
            pending_bytes: AtomicU64::new(0),
            rates: Mutex::new(LiveRates::default()),
        })
    }

    /// IP 평판 조회기를 지정합니다.
    pub fn with_reputation(mut self, reputation: Arc<dyn ReputationLookup>) -> Self {
        self.reputation = reputation;
        self
    }

    /// 상위 발신자 이름 해석기를 지정합니다.
    pub fn with_resolver(mut self, resolver: Arc<dyn DeviceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    // ─── 패킷 경로 ─────────────────────────────────────────────────

    /// 패킷 하나를 집계합니다. 의심 활동이 기록되었으면 그 사본을 돌려줍니다.
    pub fn record_packet(&self, event: &PacketEvent) -> Option<SuspiciousActivity> {
        let bytes = event.size as u64;
        let at = event.timestamp;
        self.pending_packets.fetch_add(1, Ordering::Relaxed);
        self.pending_bytes.fetch_add(bytes, Ordering::Relaxed);

        let key = FlowKey {
            src_mac: event.src_mac,
            src_ip: event.src_ip,
            dst_ip: event.dst_ip,
            dst_port: event.dst_port,
            protocol: event.protocol,
        };
        self.connections
            .entry(key)
            .and_modify(|c| {
                c.bytes = c.bytes.saturating_add(bytes);
                c.packets += 1;
                c.last_seen = c.last_seen.max(at);
            })
            .or_insert_with(|| ConnectionInfo {
                key,
                bytes,
                packets: 1,
                started_at: at,
                last_seen: at,
            });

        {
            let mut counter = self.protocols.entry(event.protocol).or_default();
            counter.packets += 1;
            counter.bytes = counter.bytes.saturating_add(bytes);
        }

        let hour = Arc::clone(
            self.hourly
                .entry(at.timestamp().div_euclid(SECS_PER_HOUR))
                .or_default()
                .value(),
        );
        {
            let mut hour = hour.lock();
            hour.bytes = hour.bytes.saturating_add(bytes);
            hour.packets += 1;
            hour.devices.insert(event.src_mac);
        }

        let talker = Arc::clone(
            self.talkers
                .entry(event.src_mac)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(TalkerEntry {
                        ip: None,
                        bytes_sent: 0,
                        packets_sent: 0,
                        last_activity: at,
                    }))
                })
                .value(),
        );
        {
            let mut talker = talker.lock();
            talker.bytes_sent = talker.bytes_sent.saturating_add(bytes);
            talker.packets_sent += 1;
            talker.last_activity = talker.last_activity.max(at);
            if event.src_ip.is_some() {
                talker.ip = event.src_ip;
            }
        }

        let activity = self.evaluate_suspicious(event)?;
        debug!(
            source = %activity.source_mac,
            level = ?activity.level,
            reasons = ?activity.reasons,
            "suspicious activity recorded"
        );
        self.suspicious.push(activity.clone());
        Some(activity)
    }

    fn evaluate_suspicious(&self, event: &PacketEvent) -> Option<SuspiciousActivity> {
        let mut reasons = Vec::new();
        let mut level = ActivityLevel::Warning;

        if let Some(src) = event.src_ip
            && let Some(threat) = self.reputation.lookup(&src)
        {
            reasons.push(format!(
                "source {src} flagged as {}: {}",
                threat.category, threat.description
            ));
            if threat.severity >= Severity::High {
                level = ActivityLevel::Critical;
            }
        }

        if let Some(port) = event.dst_port
            && let Some(name) = malware_port_name(port)
        {
            reasons.push(format!("destination port {port} is associated with {name}"));
            level = ActivityLevel::Critical;
        }

        if let (Some(src), Some(port)) = (event.src_ip, event.dst_port) {
            let tracker = Arc::clone(self.fanout.entry(src).or_default().value());
            let flagged =
                tracker
                    .lock()
                    .observe(port, event.timestamp, self.config.port_fanout_threshold);
            if let Some(distinct) = flagged {
                reasons.push(format!(
                    "{distinct} distinct destination ports within 60s"
                ));
            }
        }

        if reasons.is_empty() {
            return None;
        }
        Some(SuspiciousActivity {
            timestamp: event.timestamp,
            source_mac: event.src_mac,
            source_ip: event.src_ip,
            destination_ip: event.dst_ip,
            destination_port: event.dst_port,
            reasons,
            level,
        })
    }

    // ─── 주기 작업 ─────────────────────────────────────────────────

    /// 실시간 속도를 다시 계산하고 누적값을 비웁니다.
    ///
    /// 첫 호출은 기준 시각만 잡습니다.
    pub fn tick(&self, now: DateTime<Utc>) {
        let packets = self.pending_packets.swap(0, Ordering::Relaxed);
        let bytes = self.pending_bytes.swap(0, Ordering::Relaxed);

        let (pps, bps) = {
            let mut rates = self.rates.lock();
            if let Some(last) = rates.last_tick {
                let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
                if elapsed > 0.0 {
                    rates.packets_per_sec = packets as f64 / elapsed;
                    rates.bytes_per_sec = bytes as f64 / elapsed;
                }
            }
            rates.last_tick = Some(now);
            (rates.packets_per_sec, rates.bytes_per_sec)
        };

        metrics::gauge!(m::TELEMETRY_PACKETS_PER_SECOND).set(pps);
        metrics::gauge!(m::TELEMETRY_BYTES_PER_SECOND).set(bps);
        metrics::gauge!(m::TELEMETRY_ACTIVE_CONNECTIONS).set(self.connections.len() as f64);
        metrics::gauge!(m::TELEMETRY_HEALTH_SCORE)
            .set(f64::from(self.network_health_at(now).score));
    }

    /// 유휴 연결, 유휴 발신자, 보존 기간이 지난 시간 버킷을 정리합니다.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        let connection_idle = TimeDelta::seconds(clamp_i64(self.config.connection_idle_secs));
        let talker_idle = TimeDelta::seconds(clamp_i64(self.config.talker_idle_secs));
        let oldest_hour = now.timestamp().div_euclid(SECS_PER_HOUR)
            - clamp_i64(self.config.hourly_retention_days.saturating_mul(24));

        let before = self.connections.len();
        self.connections
            .retain(|_, c| now - c.last_seen <= connection_idle);
        self.talkers.retain(|_, t| match t.try_lock() {
            Some(t) => now - t.last_activity <= talker_idle,
            None => true,
        });
        self.hourly.retain(|&hour, _| hour >= oldest_hour);
        self.fanout.retain(|_, f| match f.try_lock() {
            Some(f) => !f.is_stale(now),
            None => true,
        });

        let evicted = before.saturating_sub(self.connections.len());
        if evicted > 0 {
            info!(evicted, remaining = self.connections.len(), "idle connections evicted");
        }
    }

    // ─── 조회 ──────────────────────────────────────────────────────

    pub fn network_health(&self) -> NetworkHealth {
        self.network_health_at(Utc::now())
    }

    pub fn network_health_at(&self, now: DateTime<Utc>) -> NetworkHealth {
        let (critical, warning) = self.suspicious.count_since(now - TimeDelta::hours(1));

        let mut total = 0usize;
        let mut unknown = 0usize;
        for entry in self.connections.iter() {
            total += 1;
            if entry.key.protocol == Protocol::Unknown {
                unknown += 1;
            }
        }
        let unknown_ratio = if total == 0 {
            0.0
        } else {
            unknown as f64 / total as f64
        };

        let score = health_score(critical, warning, unknown_ratio);
        let rates = self.rates.lock();
        NetworkHealth {
            score,
            band: HealthBand::from_score(score),
            critical_events_last_hour: critical,
            warning_events_last_hour: warning,
            unknown_protocol_ratio: unknown_ratio,
            active_connections: total,
            packets_per_sec: rates.packets_per_sec,
            bytes_per_sec: rates.bytes_per_sec,
        }
    }

    /// 현재 연결 목록 (바이트 내림차순)
    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<_> = self.connections.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.bytes.cmp(&a.bytes));
        all
    }

    /// 프로토콜 분포 (패킷 수 내림차순)
    pub fn protocol_breakdown(&self) -> Vec<ProtocolStats> {
        let counters: Vec<(Protocol, Counter)> =
            self.protocols.iter().map(|e| (*e.key(), *e.value())).collect();
        let total: u64 = counters.iter().map(|(_, c)| c.packets).sum();
        let mut stats: Vec<_> = counters
            .into_iter()
            .map(|(protocol, c)| ProtocolStats {
                protocol,
                packets: c.packets,
                bytes: c.bytes,
                percentage: if total == 0 {
                    0.0
                } else {
                    c.packets as f64 * 100.0 / total as f64
                },
            })
            .collect();
        stats.sort_by(|a, b| b.packets.cmp(&a.packets));
        stats
    }

    pub fn hourly_traffic(&self, hours: usize) -> Vec<HourlyTraffic> {
        self.hourly_traffic_at(hours, Utc::now())
    }

    /// 현재 시각을 포함한 최근 `hours`시간 (오래된 순, 빈 시간은 0)
    pub fn hourly_traffic_at(&self, hours: usize, now: DateTime<Utc>) -> Vec<HourlyTraffic> {
        let retention = clamp_i64(self.config.hourly_retention_days.saturating_mul(24));
        let hours = i64::try_from(hours).unwrap_or(i64::MAX).min(retention);
        let current = now.timestamp().div_euclid(SECS_PER_HOUR);

        ((current - hours + 1)..=current)
            .map(|hour| {
                let hour_start = DateTime::from_timestamp(hour * SECS_PER_HOUR, 0)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                let bucket = self.hourly.get(&hour).map(|e| Arc::clone(e.value()));
                match bucket {
                    Some(bucket) => {
                        let bucket = bucket.lock();
                        HourlyTraffic {
                            hour_start,
                            bytes: bucket.bytes,
                            packets: bucket.packets,
                            unique_devices: bucket.devices.len(),
                        }
                    }
                    None => HourlyTraffic {
                        hour_start,
                        bytes: 0,
                        packets: 0,
                        unique_devices: 0,
                    },
                }
            })
            .collect()
    }

    /// 보낸 바이트 기준 상위 N개 발신자
    pub fn top_talkers(&self, n: usize) -> Vec<TopTalker> {
        let entries: Vec<(MacAddr, Arc<Mutex<TalkerEntry>>)> = self
            .talkers
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        let mut talkers: Vec<TopTalker> = entries
            .into_iter()
            .map(|(mac, entry)| {
                let entry = entry.lock().clone();
                TopTalker {
                    mac,
                    ip: entry.ip,
                    device_name: None,
                    bytes_sent: entry.bytes_sent,
                    packets_sent: entry.packets_sent,
                    last_activity: entry.last_activity,
                }
            })
            .collect();
        talkers.sort_by(|a, b| b.bytes_sent.cmp(&a.bytes_sent));
        talkers.truncate(n);
        for talker in &mut talkers {
            talker.device_name = self.resolver.resolve(&talker.mac).and_then(|d| d.name);
        }
        talkers
    }

    /// 최신순 의심 활동 N건
    pub fn suspicious_activities(&self, n: usize) -> Vec<SuspiciousActivity> {
        self.suspicious.recent(n)
    }

    /// 링 버퍼에 남아 있는 의심 활동 수
    pub fn suspicious_count(&self) -> usize {
        self.suspicious.len()
    }
}

/// 설정값(초 또는 시간)을 100년 이내의 i64로 자릅니다.
fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX).min(100 * 365 * 86_400)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use lanshield_core::collab::{StaticDeviceResolver, StaticReputationList};

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, last])
    }

    fn packet(src: u8, src_ip: &str, dst_port: u16, size: usize, secs: i64) -> PacketEvent {
        let mut b = PacketEvent::builder(mac(src), mac(0xfe), size);
        b.protocol(Protocol::Tcp)
            .addresses(src_ip.parse().unwrap(), "10.0.0.1".parse().unwrap())
            .ports(50_000, dst_port)
            .timestamp(at(secs));
        b.build()
    }

    fn telemetry() -> TrafficTelemetry {
        TrafficTelemetry::new(TelemetryConfig::default()).unwrap()
    }

    #[test]
    fn rejects_zero_capacity() {
        let result = TrafficTelemetry::new(TelemetryConfig {
            suspicious_capacity: 0,
            ..TelemetryConfig::default()
        });
        assert!(matches!(result, Err(TelemetryError::InvalidSetting { .. })));
    }

    #[test]
    fn connections_aggregate_per_flow() {
        let t = telemetry();
        t.record_packet(&packet(1, "10.0.0.5", 443, 100, 0));
        t.record_packet(&packet(1, "10.0.0.5", 443, 200, 1));
        t.record_packet(&packet(1, "10.0.0.5", 80, 50, 2));

        let conns = t.active_connections();
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].bytes, 300);
        assert_eq!(conns[0].packets, 2);
        assert_eq!(conns[0].started_at, at(0));
        assert_eq!(conns[0].last_seen, at(1));
    }

    #[test]
    fn clean_traffic_scores_excellent() {
        let t = telemetry();
        t.record_packet(&packet(1, "10.0.0.5", 443, 100, 0));
        let health = t.network_health_at(at(1));
        assert_eq!(health.score, 100);
        assert_eq!(health.band, HealthBand::Excellent);
    }

    #[test]
    fn malware_port_is_critical_and_lowers_score() {
        let t = telemetry();
        let activity = t.record_packet(&packet(1, "10.0.0.5", 31337, 60, 0)).unwrap();
        assert_eq!(activity.level, ActivityLevel::Critical);
        assert!(activity.reasons[0].contains("Back Orifice"));

        let health = t.network_health_at(at(10));
        assert_eq!(health.score, 80);
        assert_eq!(health.critical_events_last_hour, 1);

        // 1시간이 지나면 감점 없음
        assert_eq!(t.network_health_at(at(3_700)).score, 100);
    }

    #[test]
    fn reputation_hit_is_recorded() {
        let list = StaticReputationList::from_addresses(
            HashSet::from(["203.0.113.9".parse().unwrap()]),
            "botnet",
        );
        let t = telemetry().with_reputation(Arc::new(list));
        let activity = t.record_packet(&packet(1, "203.0.113.9", 443, 60, 0)).unwrap();
        assert_eq!(activity.level, ActivityLevel::Critical);
        assert!(activity.reasons[0].contains("botnet"));
        assert!(t.record_packet(&packet(2, "10.0.0.6", 443, 60, 0)).is_none());
    }

    #[test]
    fn port_fanout_is_a_warning() {
        let t = telemetry();
        let mut recorded = Vec::new();
        for port in 0..12u16 {
            if let Some(a) = t.record_packet(&packet(1, "10.0.0.5", 8000 + port, 60, 0)) {
                recorded.push(a);
            }
        }
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].level, ActivityLevel::Warning);
        assert_eq!(t.network_health_at(at(1)).score, 95);
        assert_eq!(t.suspicious_activities(10).len(), 1);
    }

    #[test]
    fn unknown_protocol_share_penalizes() {
        let t = telemetry();
        t.record_packet(&packet(1, "10.0.0.5", 443, 60, 0));
        let mut b = PacketEvent::builder(mac(3), mac(4), 60);
        b.timestamp(at(0));
        t.record_packet(&b.build());
        assert_eq!(t.network_health_at(at(1)).score, 85);
    }

    #[test]
    fn tick_computes_rates_and_resets() {
        let t = telemetry();
        t.tick(at(0));
        for i in 0..100 {
            t.record_packet(&packet(1, "10.0.0.5", 443, 1_000, i % 2));
        }
        t.tick(at(2));
        let health = t.network_health_at(at(2));
        assert_eq!(health.packets_per_sec, 50.0);
        assert_eq!(health.bytes_per_sec, 50_000.0);

        t.tick(at(3));
        assert_eq!(t.network_health_at(at(3)).packets_per_sec, 0.0);
    }

    #[test]
    fn protocol_breakdown_percentages() {
        let t = telemetry();
        for _ in 0..3 {
            t.record_packet(&packet(1, "10.0.0.5", 443, 100, 0));
        }
        let mut b = PacketEvent::builder(mac(3), MacAddr::BROADCAST, 42);
        b.protocol(Protocol::Arp).timestamp(at(0));
        t.record_packet(&b.build());

        let stats = t.protocol_breakdown();
        assert_eq!(stats[0].protocol, Protocol::Tcp);
        assert_eq!(stats[0].percentage, 75.0);
        assert_eq!(stats[1].packets, 1);
    }

    #[test]
    fn hourly_traffic_fills_gaps() {
        let t = telemetry();
        let hour_start = at(0).timestamp().div_euclid(SECS_PER_HOUR) * SECS_PER_HOUR;
        let base = hour_start - 1_700_000_000;
        t.record_packet(&packet(1, "10.0.0.5", 443, 100, base));
        t.record_packet(&packet(2, "10.0.0.6", 443, 100, base + 10));
        t.record_packet(&packet(1, "10.0.0.5", 443, 100, base + 2 * 3_600));

        let hours = t.hourly_traffic_at(3, at(base + 2 * 3_600 + 5));
        assert_eq!(hours.len(), 3);
        assert_eq!(hours[0].bytes, 200);
        assert_eq!(hours[0].unique_devices, 2);
        assert_eq!(hours[1].packets, 0);
        assert_eq!(hours[2].packets, 1);
    }

    #[test]
    fn top_talkers_carry_device_names() {
        let resolver = StaticDeviceResolver::new().with_device(mac(2), "dev-2", Some("nas".to_owned()));
        let t = telemetry().with_resolver(Arc::new(resolver));
        t.record_packet(&packet(1, "10.0.0.5", 443, 100, 0));
        t.record_packet(&packet(2, "10.0.0.6", 443, 900, 0));

        let top = t.top_talkers(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].mac, mac(2));
        assert_eq!(top[0].device_name.as_deref(), Some("nas"));
    }

    #[test]
    fn cleanup_evicts_idle_state() {
        let t = telemetry();
        t.record_packet(&packet(1, "10.0.0.5", 443, 100, 0));
        t.record_packet(&packet(2, "10.0.0.6", 443, 100, 1_000));

        t.cleanup(at(1_100));
        assert_eq!(t.active_connections().len(), 1);
        assert_eq!(t.top_talkers(10).len(), 2);

        t.cleanup(at(4_000));
        let talkers = t.top_talkers(10);
        assert_eq!(talkers.len(), 1);
        assert_eq!(talkers[0].mac, mac(2));

        t.cleanup(at(8 * 86_400 + 5_000));
        assert!(t.hourly_traffic_at(1, at(0)).iter().all(|h| h.packets == 0));
    }
}
