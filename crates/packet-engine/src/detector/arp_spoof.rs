//! ARP 스푸핑 탐지
//!
//! ARP 발신자 주소 → 하드웨어 주소 바인딩을 유지합니다 (last-writer-wins).
//! 기존 바인딩과 다른 하드웨어 주소가 보이면 Critical 알림 후 덮어씁니다.
//! 테이블은 `max_arp_entries`를 넘으면 가장 오래 갱신되지 않은 바인딩부터 버립니다.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use lanshield_core::config::DetectionConfig;
use lanshield_core::error::DetectionError;
use lanshield_core::event::PacketEvent;
use lanshield_core::pipeline::BoxFuture;
use lanshield_core::types::{Alert, AlertType, MacAddr, Severity};

use super::PacketDetector;

#[derive(Debug, Clone, Copy)]
struct Binding {
    mac: MacAddr,
    updated_at: DateTime<Utc>,
}

/// ARP 스푸핑 탐지기
pub struct ArpSpoofDetector {
    table: DashMap<IpAddr, Binding>,
    max_entries: usize,
}

impl ArpSpoofDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            table: DashMap::new(),
            max_entries: config.max_arp_entries,
        }
    }

    /// 현재 바인딩 조회
    pub fn binding(&self, ip: &IpAddr) -> Option<MacAddr> {
        self.table.get(ip).map(|b| b.mac)
    }

    /// 새 바인딩을 기록하고, 바뀐 경우 이전 하드웨어 주소를 돌려줍니다.
    fn rebind(&self, ip: IpAddr, mac: MacAddr, at: DateTime<Utc>) -> Option<MacAddr> {
        match self.table.entry(ip) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().mac;
                entry.insert(Binding { mac, updated_at: at });
                return (previous != mac).then_some(previous);
            }
            Entry::Vacant(entry) => {
                entry.insert(Binding { mac, updated_at: at });
            }
        }
        if self.table.len() > self.max_entries {
            self.evict_oldest(ip);
        }
        None
    }

    fn evict_oldest(&self, keep: IpAddr) {
        let oldest = self
            .table
            .iter()
            .filter(|entry| *entry.key() != keep)
            .min_by_key(|entry| entry.value().updated_at)
            .map(|entry| *entry.key());
        if let Some(ip) = oldest {
            self.table.remove(&ip);
            debug!(ip = %ip, "arp table full, evicted oldest binding");
        }
    }

    fn evaluate(&self, event: &PacketEvent) -> Option<Alert> {
        if !event.is_arp() {
            return None;
        }
        let sender = event.src_ip?;
        if sender.is_unspecified() {
            // ARP probe (RFC 5227)
            return None;
        }

        let previous = self.rebind(sender, event.src_mac, event.timestamp)?;
        info!(ip = %sender, old = %previous, new = %event.src_mac, "arp binding changed");
        Some(
            Alert::new(
                AlertType::ArpSpoofing,
                Severity::Critical,
                format!("ARP spoofing detected for {sender}"),
                format!(
                    "{sender} moved from {previous} to {}; possible ARP cache poisoning",
                    event.src_mac
                ),
            )
            .with_source_mac(event.src_mac)
            .with_source_ip(Some(sender))
            .with_created_at(event.timestamp),
        )
    }
}

impl PacketDetector for ArpSpoofDetector {
    fn name(&self) -> &'static str {
        "arp_spoof"
    }

    fn inspect<'a>(
        &'a self,
        event: &'a PacketEvent,
    ) -> BoxFuture<'a, Result<Option<Alert>, DetectionError>> {
        Box::pin(std::future::ready(Ok(self.evaluate(event))))
    }

    fn tracked_entries(&self) -> usize {
        self.table.len()
    }
}
