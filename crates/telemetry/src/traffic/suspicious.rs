//! 의심 활동 기록

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use lanshield_core::types::{Alert, AlertType, MacAddr, Severity};

/// 알려진 악성코드/백도어 포트
static MALWARE_PORTS: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (1243, "SubSeven"),
        (1337, "WASTE backdoor"),
        (4444, "Metasploit handler"),
        (5554, "Sasser"),
        (6667, "IRC botnet C2"),
        (6969, "GateCrasher"),
        (9996, "Sasser FTP"),
        (12345, "NetBus"),
        (20034, "NetBus Pro"),
        (27374, "SubSeven"),
        (31337, "Back Orifice"),
        (65506, "PhatBot"),
    ])
});

/// 포트가 악성코드 목록에 있으면 이름을 돌려줍니다.
pub fn malware_port_name(port: u16) -> Option<&'static str> {
    MALWARE_PORTS.get(&port).copied()
}

/// 의심 활동 등급
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Warning,
    Critical,
}

/// 의심 활동 한 건
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousActivity {
    pub timestamp: DateTime<Utc>,
    pub source_mac: MacAddr,
    pub source_ip: Option<IpAddr>,
    pub destination_ip: Option<IpAddr>,
    pub destination_port: Option<u16>,
    pub reasons: Vec<String>,
    pub level: ActivityLevel,
}

impl SuspiciousActivity {
    /// 디스패처로 보낼 알림으로 변환합니다.
    ///
    /// Critical은 `MalwareCritical`, Warning은 `SuspiciousTraffic`입니다.
    pub fn to_alert(&self) -> Alert {
        let source = self
            .source_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| self.source_mac.to_string());
        let (alert_type, severity, title) = match self.level {
            ActivityLevel::Critical => (
                AlertType::MalwareCritical,
                Severity::Critical,
                format!("Malicious traffic from {source}"),
            ),
            ActivityLevel::Warning => (
                AlertType::SuspiciousTraffic,
                Severity::Medium,
                format!("Suspicious traffic from {source}"),
            ),
        };
        let mut alert = Alert::new(alert_type, severity, title, self.reasons.join("; "))
            .with_source_mac(self.source_mac)
            .with_source_ip(self.source_ip)
            .with_destination_ip(self.destination_ip)
            .with_created_at(self.timestamp);
        if let Some(port) = self.destination_port {
            alert = alert.with_port(port);
        }
        alert
    }
}

/// 크기가 고정된 의심 활동 링 버퍼 (가득 차면 가장 오래된 것부터 버림)
#[derive(Debug)]
pub(crate) struct ActivityRing {
    capacity: usize,
    entries: Mutex<VecDeque<SuspiciousActivity>>,
}

impl ActivityRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub(crate) fn push(&self, activity: SuspiciousActivity) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(activity);
    }

    /// 최신순 N건
    pub(crate) fn recent(&self, n: usize) -> Vec<SuspiciousActivity> {
        self.entries.lock().iter().rev().take(n).cloned().collect()
    }

    /// `since` 이후 (critical, warning) 건수
    pub(crate) fn count_since(&self, since: DateTime<Utc>) -> (usize, usize) {
        self.entries
            .lock()
            .iter()
            .filter(|a| a.timestamp >= since)
            .fold((0, 0), |(c, w), a| match a.level {
                ActivityLevel::Critical => (c + 1, w),
                ActivityLevel::Warning => (c, w + 1),
            })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// 출발지별 목적지 포트 확산 추적 (1분 창)
#[derive(Debug, Default)]
pub(crate) struct FanoutTracker {
    ports: VecDeque<(u16, DateTime<Utc>)>,
    flagged_at: Option<DateTime<Utc>>,
}

impl FanoutTracker {
    const WINDOW_SECS: i64 = 60;

    fn window() -> TimeDelta {
        TimeDelta::seconds(Self::WINDOW_SECS)
    }

    /// 포트를 기록하고, 이번 창에서 처음으로 임계값을 넘었으면 고유 포트 수를 돌려줍니다.
    pub(crate) fn observe(
        &mut self,
        port: u16,
        at: DateTime<Utc>,
        threshold: usize,
    ) -> Option<usize> {
        let cutoff = at - Self::window();
        self.ports.retain(|(p, seen)| *seen >= cutoff && *p != port);
        self.ports.push_back((port, at));
        if self.flagged_at.is_some_and(|f| f < cutoff) {
            self.flagged_at = None;
        }
        if self.ports.len() > threshold && self.flagged_at.is_none() {
            self.flagged_at = Some(at);
            return Some(self.ports.len());
        }
        None
    }

    pub(crate) fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let cutoff = now - Self::window();
        let last = self.ports.iter().map(|(_, seen)| *seen).max();
        last.max(self.flagged_at).is_none_or(|t| t < cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn activity(level: ActivityLevel, secs: i64) -> SuspiciousActivity {
        SuspiciousActivity {
            timestamp: at(secs),
            source_mac: MacAddr::new([2, 0, 0, 0, 0, 1]),
            source_ip: "10.0.0.5".parse().ok(),
            destination_ip: None,
            destination_port: Some(4444),
            reasons: vec!["a".to_owned(), "b".to_owned()],
            level,
        }
    }

    #[test]
    fn ring_evicts_oldest() {
        let ring = ActivityRing::new(3);
        for i in 0..5 {
            ring.push(activity(ActivityLevel::Warning, i));
        }
        assert_eq!(ring.len(), 3);
        let recent = ring.recent(10);
        assert_eq!(recent[0].timestamp, at(4));
        assert_eq!(recent[2].timestamp, at(2));
    }

    #[test]
    fn ring_counts_by_level() {
        let ring = ActivityRing::new(10);
        ring.push(activity(ActivityLevel::Critical, 0));
        ring.push(activity(ActivityLevel::Warning, 10));
        ring.push(activity(ActivityLevel::Critical, 20));
        assert_eq!(ring.count_since(at(5)), (1, 1));
    }

    #[test]
    fn fanout_flags_once_per_window() {
        let mut t = FanoutTracker::default();
        let mut flagged = Vec::new();
        for i in 0..15u16 {
            if let Some(n) = t.observe(1000 + i, at(i64::from(i)), 10) {
                flagged.push(n);
            }
        }
        assert_eq!(flagged, vec![11]);

        // 창이 지나면 다시 판정
        for i in 0..11u16 {
            t.observe(2000 + i, at(200), 10);
        }
        assert!(t.flagged_at == Some(at(200)));
    }

    #[test]
    fn critical_activity_becomes_malware_alert() {
        let alert = activity(ActivityLevel::Critical, 0).to_alert();
        assert_eq!(alert.alert_type, AlertType::MalwareCritical);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.message, "a; b");
        assert_eq!(alert.port, Some(4444));

        let warning = activity(ActivityLevel::Warning, 0).to_alert();
        assert_eq!(warning.alert_type, AlertType::SuspiciousTraffic);
    }

    #[test]
    fn malware_port_lookup() {
        assert_eq!(malware_port_name(31337), Some("Back Orifice"));
        assert_eq!(malware_port_name(443), None);
    }
}
