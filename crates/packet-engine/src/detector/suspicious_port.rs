//! 의심 포트 접근 탐지
//!
//! 설정된 포트 집합으로 향하는 패킷에 대해 (출발지, 포트)별 쿨다운을 두고
//! Medium 알림을 냅니다.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use lanshield_core::config::DetectionConfig;
use lanshield_core::error::DetectionError;
use lanshield_core::event::PacketEvent;
use lanshield_core::pipeline::BoxFuture;
use lanshield_core::types::{Alert, AlertType, Severity};

use super::{PacketDetector, seconds};

static SERVICE_NAMES: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (21, "FTP"),
        (23, "Telnet"),
        (135, "MS-RPC"),
        (139, "NetBIOS"),
        (445, "SMB"),
        (1433, "MSSQL"),
        (3306, "MySQL"),
        (3389, "RDP"),
        (4444, "Metasploit"),
        (5900, "VNC"),
        (6667, "IRC"),
        (31337, "Back Orifice"),
    ])
});

/// 잘 알려진 위험 포트의 서비스 이름
pub fn service_name(port: u16) -> Option<&'static str> {
    SERVICE_NAMES.get(&port).copied()
}

/// 의심 포트 탐지기
pub struct SuspiciousPortDetector {
    ports: HashSet<u16>,
    cooldown: TimeDelta,
    last_alert: DashMap<(IpAddr, u16), DateTime<Utc>>,
}

impl SuspiciousPortDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            ports: config.suspicious_ports.iter().copied().collect(),
            cooldown: seconds(config.suspicious_port_cooldown_secs),
            last_alert: DashMap::new(),
        }
    }

    /// (출발지, 포트) 쿨다운을 원자적으로 확인·갱신합니다.
    fn claim(&self, key: (IpAddr, u16), now: DateTime<Utc>) -> bool {
        match self.last_alert.entry(key) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < self.cooldown {
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

    fn evaluate(&self, event: &PacketEvent) -> Option<Alert> {
        let port = event.dst_port.filter(|p| self.ports.contains(p))?;
        let source = event.src_ip?;
        if !self.claim((source, port), event.timestamp) {
            return None;
        }

        let service = service_name(port).unwrap_or("unknown service");
        let target = event
            .dst_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown host".to_owned());
        Some(
            Alert::new(
                AlertType::SuspiciousPort,
                Severity::Medium,
                format!("Suspicious port access: {port} ({service})"),
                format!("{source} connected to {target} on port {port} ({service})"),
            )
            .with_source_mac(event.src_mac)
            .with_source_ip(Some(source))
            .with_destination_ip(event.dst_ip)
            .with_port(port)
            .with_created_at(event.timestamp),
        )
    }
}

impl PacketDetector for SuspiciousPortDetector {
    fn name(&self) -> &'static str {
        "suspicious_port"
    }

    fn inspect<'a>(
        &'a self,
        event: &'a PacketEvent,
    ) -> BoxFuture<'a, Result<Option<Alert>, DetectionError>> {
        Box::pin(std::future::ready(Ok(self.evaluate(event))))
    }

    fn cleanup_stale(&self, now: DateTime<Utc>) {
        self.last_alert.retain(|_, at| now - *at < self.cooldown);
    }

    fn tracked_entries(&self) -> usize {
        self.last_alert.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn detector() -> SuspiciousPortDetector {
        SuspiciousPortDetector::new(&DetectionConfig::default())
    }

    #[tokio::test]
    async fn configured_port_raises_medium_alert() {
        let d = detector();
        let alert = d
            .inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 3389, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.port, Some(3389));
        assert!(alert.title.contains("RDP"));
    }

    #[tokio::test]
    async fn other_ports_are_ignored() {
        let d = detector();
        assert!(d.inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 443, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cooldown_is_per_source_and_port() {
        let d = detector();
        assert!(d.inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 23, 0)).await.unwrap().is_some());
        assert!(d.inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 23, 299)).await.unwrap().is_none());
        assert!(d.inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 445, 10)).await.unwrap().is_some());
        assert!(d.inspect(&tcp(mac(2), "10.0.0.6", "10.0.0.1", 23, 10)).await.unwrap().is_some());
        assert!(d.inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 23, 300)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleanup_drops_expired_cooldowns() {
        let d = detector();
        d.inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 23, 0)).await.unwrap();
        d.inspect(&tcp(mac(1), "10.0.0.5", "10.0.0.1", 445, 200)).await.unwrap();
        d.cleanup_stale(at(400));
        assert_eq!(d.tracked_entries(), 1);
    }

    #[test]
    fn unknown_service_has_no_name() {
        assert_eq!(service_name(8080), None);
        assert_eq!(service_name(445), Some("SMB"));
    }
}
