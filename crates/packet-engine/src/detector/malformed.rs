//! 비정상 패킷 탐지 (상태 없음)

use lanshield_core::error::DetectionError;
use lanshield_core::event::PacketEvent;
use lanshield_core::pipeline::BoxFuture;
use lanshield_core::types::{Alert, AlertType, MacAddr, Severity};

use super::PacketDetector;

/// 출발지 하드웨어 주소/네트워크 주소의 형식 위반을 검사합니다.
///
/// 위반 항목이 하나 이상이면 전부 나열한 Low 알림 하나를 냅니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct MalformedPacketDetector;

impl MalformedPacketDetector {
    pub fn new() -> Self {
        Self
    }

    fn violations(event: &PacketEvent) -> Vec<String> {
        let mut found = Vec::new();
        if event.src_mac.is_zero() {
            found.push(format!("all-zero source MAC {}", MacAddr::ZERO));
        }
        if event.src_mac.is_broadcast() {
            found.push(format!("broadcast source MAC {}", MacAddr::BROADCAST));
        }
        if event.has_unspecified_ipv4_source() && !event.is_arp() {
            found.push("invalid source address 0.0.0.0".to_owned());
        }
        found
    }

    fn evaluate(event: &PacketEvent) -> Option<Alert> {
        let violations = Self::violations(event);
        if violations.is_empty() {
            return None;
        }
        Some(
            Alert::new(
                AlertType::MalformedPacket,
                Severity::Low,
                "Malformed packet detected",
                violations.join("; "),
            )
            .with_source_mac(event.src_mac)
            .with_source_ip(event.src_ip)
            .with_destination_ip(event.dst_ip)
            .with_created_at(event.timestamp),
        )
    }
}

impl PacketDetector for MalformedPacketDetector {
    fn name(&self) -> &'static str {
        "malformed_packet"
    }

    fn inspect<'a>(
        &'a self,
        event: &'a PacketEvent,
    ) -> BoxFuture<'a, Result<Option<Alert>, DetectionError>> {
        Box::pin(std::future::ready(Ok(Self::evaluate(event))))
    }
}
