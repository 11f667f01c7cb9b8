//! 프로토콜 디코더: 원시 링크 계층 프레임 → [`PacketEvent`]
//!
//! # 디코딩 규칙
//! - 14바이트(Ethernet II 헤더) 미만이면 `None` (유일한 폐기 조건)
//! - 802.1Q VLAN 태그 하나는 건너뜀
//! - ARP: sender/target 프로토콜 주소와 오퍼레이션 코드를 직접 파싱
//! - IPv4/IPv6: `etherparse`로 네트워크/전송 계층 파싱 (TCP, UDP, ICMP, ICMPv6)
//! - 네트워크/전송 헤더가 잘렸거나 지원하지 않는 프로토콜이면 하드웨어 주소만 가진
//!   최소 이벤트(`Protocol::Unknown`, ARP EtherType이면 `Protocol::Arp`)
//!
//! 디코더는 입력 값과 무관하게 프레임 길이에 비례하는 시간 안에 끝나며 패닉하지 않습니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use etherparse::{IpHeader, PacketHeaders, TransportHeader};

use lanshield_core::event::{ArpOperation, PacketEvent, PacketEventBuilder};
use lanshield_core::types::{MacAddr, Protocol};

/// Ethernet II 헤더 길이
pub const ETHERNET_HEADER_LEN: usize = 14;
/// 802.1Q 태그 길이
const VLAN_TAG_LEN: usize = 4;
/// IPv4-over-Ethernet ARP 페이로드 길이
const ARP_PAYLOAD_LEN: usize = 28;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_IPV6: u16 = 0x86DD;

/// 프레임 디코더
///
/// 상태가 없으므로 여러 스레드에서 공유해도 됩니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketDecoder {
    keep_raw: bool,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이벤트에 원시 프레임 사본을 보관하도록 설정합니다.
    pub fn keep_raw(mut self, keep: bool) -> Self {
        self.keep_raw = keep;
        self
    }

    /// 현재 시각을 타임스탬프로 프레임을 디코딩합니다.
    pub fn decode(&self, frame: &[u8]) -> Option<PacketEvent> {
        self.decode_at(frame, Utc::now())
    }

    /// 캡처 시각을 지정하여 프레임을 디코딩합니다.
    pub fn decode_at(&self, frame: &[u8], timestamp: DateTime<Utc>) -> Option<PacketEvent> {
        if frame.len() < ETHERNET_HEADER_LEN {
            return None;
        }
        let dst_mac = MacAddr::from_slice(&frame[0..6])?;
        let src_mac = MacAddr::from_slice(&frame[6..12])?;

        let mut builder = PacketEvent::builder(src_mac, dst_mac, frame.len());
        builder.timestamp(timestamp);
        if self.keep_raw {
            builder.raw(Bytes::copy_from_slice(frame));
        }

        let (ether_type, payload_offset) = link_payload(frame);
        match ether_type {
            Some(ETHERTYPE_ARP) => {
                builder.protocol(Protocol::Arp);
                if let Some(payload) = frame.get(payload_offset..) {
                    decode_arp(payload, &mut builder);
                }
            }
            Some(ETHERTYPE_IPV4) | Some(ETHERTYPE_IPV6) => decode_ip(frame, &mut builder),
            _ => {}
        }

        Some(builder.build())
    }
}

/// 현재 시각으로 프레임을 디코딩합니다 (원시 바이트는 보관하지 않음).
pub fn decode(frame: &[u8]) -> Option<PacketEvent> {
    PacketDecoder::new().decode(frame)
}

/// EtherType과 페이로드 시작 오프셋. VLAN 태그가 잘렸으면 EtherType은 `None`.
fn link_payload(frame: &[u8]) -> (Option<u16>, usize) {
    let outer = u16::from_be_bytes([frame[12], frame[13]]);
    if outer != ETHERTYPE_VLAN {
        return (Some(outer), ETHERNET_HEADER_LEN);
    }
    match frame.get(16..18) {
        Some(inner) => (
            Some(u16::from_be_bytes([inner[0], inner[1]])),
            ETHERNET_HEADER_LEN + VLAN_TAG_LEN,
        ),
        None => (None, frame.len()),
    }
}

/// IPv4-over-Ethernet ARP만 해석합니다. 그 밖의 형식은 ARP 레이블만 남깁니다.
fn decode_arp(payload: &[u8], builder: &mut PacketEventBuilder) {
    let Some(arp) = payload.get(..ARP_PAYLOAD_LEN) else {
        return;
    };
    let hw_type = u16::from_be_bytes([arp[0], arp[1]]);
    let proto_type = u16::from_be_bytes([arp[2], arp[3]]);
    let (hw_len, proto_len) = (arp[4], arp[5]);
    if hw_type != 1 || proto_type != ETHERTYPE_IPV4 || hw_len != 6 || proto_len != 4 {
        return;
    }
    let operation = u16::from_be_bytes([arp[6], arp[7]]);
    let sender = Ipv4Addr::new(arp[14], arp[15], arp[16], arp[17]);
    let target = Ipv4Addr::new(arp[24], arp[25], arp[26], arp[27]);
    builder
        .arp_operation(ArpOperation::from(operation))
        .addresses(IpAddr::V4(sender), IpAddr::V4(target));
}

fn decode_ip(frame: &[u8], builder: &mut PacketEventBuilder) {
    // 헤더가 잘린 경우 하드웨어 주소만 남깁니다.
    let Ok(headers) = PacketHeaders::from_ethernet_slice(frame) else {
        return;
    };

    if let Some(ip) = &headers.ip {
        let (src, dst) = match ip {
            IpHeader::Version4(h, _) => (
                IpAddr::V4(Ipv4Addr::from(h.source)),
                IpAddr::V4(Ipv4Addr::from(h.destination)),
            ),
            IpHeader::Version6(h, _) => (
                IpAddr::V6(Ipv6Addr::from(h.source)),
                IpAddr::V6(Ipv6Addr::from(h.destination)),
            ),
        };
        builder.addresses(src, dst);
    }

    match &headers.transport {
        Some(TransportHeader::Tcp(tcp)) => {
            builder
                .protocol(Protocol::Tcp)
                .ports(tcp.source_port, tcp.destination_port);
        }
        Some(TransportHeader::Udp(udp)) => {
            builder
                .protocol(Protocol::Udp)
                .ports(udp.source_port, udp.destination_port);
        }
        Some(TransportHeader::Icmpv4(_)) => {
            builder.protocol(Protocol::Icmp);
        }
        Some(TransportHeader::Icmpv6(_)) => {
            builder.protocol(Protocol::Icmpv6);
        }
        None => {}
    }
}


#[cfg(test)]
mod tests {
    use super::frames::*;
    use super::*;

    #[test]
    fn short_buffer_is_discarded() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[0u8; 13]).is_none());
    }

    #[test]
    fn bare_ethernet_header_yields_minimal_event() {
        let frame = ethernet(SRC, DST, 0x0800, &[]);
        let event = decode(&frame).unwrap();
        assert_eq!(event.src_mac, MacAddr::new(SRC));
        assert_eq!(event.dst_mac, MacAddr::new(DST));
        assert_eq!(event.protocol, Protocol::Unknown);
        assert!(event.src_ip.is_none());
        assert_eq!(event.size, 14);
    }

    #[test]
    fn decodes_tcp() {
        let frame = tcp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 443);
        let event = decode(&frame).unwrap();
        assert_eq!(event.protocol, Protocol::Tcp);
        assert_eq!(event.src_ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(event.dst_ip, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(event.src_port, Some(40000));
        assert_eq!(event.dst_port, Some(443));
        assert_eq!(event.size, frame.len());
    }

    #[test]
    fn decodes_udp() {
        let frame = udp([192, 168, 1, 10], [8, 8, 8, 8], 53000, 53);
        let event = decode(&frame).unwrap();
        assert_eq!(event.protocol, Protocol::Udp);
        assert_eq!(event.dst_port, Some(53));
    }

    #[test]
    fn decodes_icmp_without_ports() {
        let frame = icmp_echo([192, 168, 1, 10], [192, 168, 1, 1]);
        let event = decode(&frame).unwrap();
        assert_eq!(event.protocol, Protocol::Icmp);
        assert!(event.dst_port.is_none());
        assert!(event.src_ip.is_some());
    }

    #[test]
    fn decodes_arp_addresses_and_operation() {
        let frame = arp(SRC, 2, [192, 168, 1, 1], [192, 168, 1, 20]);
        let event = decode(&frame).unwrap();
        assert_eq!(event.protocol, Protocol::Arp);
        assert_eq!(event.arp_operation, Some(ArpOperation::Reply));
        assert_eq!(event.src_ip, Some("192.168.1.1".parse().unwrap()));
        assert_eq!(event.dst_ip, Some("192.168.1.20".parse().unwrap()));
        assert_eq!(event.src_mac, MacAddr::new(SRC));
    }

    #[test]
    fn truncated_arp_keeps_label_only() {
        let mut frame = arp(SRC, 1, [192, 168, 1, 1], [192, 168, 1, 20]);
        frame.truncate(14 + 10);
        let event = decode(&frame).unwrap();
        assert_eq!(event.protocol, Protocol::Arp);
        assert!(event.src_ip.is_none());
        assert!(event.arp_operation.is_none());
    }

    #[test]
    fn truncated_tcp_yields_minimal_event() {
        let mut frame = tcp([10, 0, 0, 1], [10, 0, 0, 2], 1234, 80);
        frame.truncate(14 + 20 + 6);
        let event = decode(&frame).unwrap();
        assert_eq!(event.protocol, Protocol::Unknown);
        assert!(event.src_port.is_none());
        assert_eq!(event.src_mac, MacAddr::new(SRC));
    }

    #[test]
    fn unsupported_ethertype_is_unknown() {
        let frame = ethernet(SRC, DST, 0x88cc, &[0u8; 32]); // LLDP
        let event = decode(&frame).unwrap();
        assert_eq!(event.protocol, Protocol::Unknown);
    }

    #[test]
    fn single_vlan_tag_is_skipped() {
        let plain = tcp([10, 0, 0, 1], [10, 0, 0, 2], 5555, 22);
        let mut tagged = plain[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x64]); // VLAN 100
        tagged.extend_from_slice(&plain[12..]);
        let event = decode(&tagged).unwrap();
        assert_eq!(event.protocol, Protocol::Tcp);
        assert_eq!(event.dst_port, Some(22));
        assert_eq!(event.size, tagged.len());
    }

    #[test]
    fn vlan_tagged_arp() {
        let plain = arp(SRC, 1, [10, 1, 1, 1], [10, 1, 1, 2]);
        let mut tagged = plain[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x0a]);
        tagged.extend_from_slice(&plain[12..]);
        let event = decode(&tagged).unwrap();
        assert_eq!(event.protocol, Protocol::Arp);
        assert_eq!(event.src_ip, Some("10.1.1.1".parse().unwrap()));
    }

    #[test]
    fn raw_bytes_kept_only_when_enabled() {
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2);
        assert!(PacketDecoder::new().decode(&frame).unwrap().raw.is_none());
        let event = PacketDecoder::new().keep_raw(true).decode(&frame).unwrap();
        assert_eq!(event.raw.as_deref(), Some(frame.as_slice()));
    }

    #[test]
    fn timestamp_is_taken_from_caller() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let frame = udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2);
        let event = PacketDecoder::new().decode_at(&frame, at).unwrap();
        assert_eq!(event.timestamp, at);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_panics_on_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
                let _ = decode(&data);
            }

            #[test]
            fn discards_only_short_frames(data in proptest::collection::vec(any::<u8>(), 0..256)) {
                let result = decode(&data);
                prop_assert_eq!(result.is_none(), data.len() < ETHERNET_HEADER_LEN);
                if let Some(event) = result {
                    prop_assert_eq!(event.size, data.len());
                }
            }

            #[test]
            fn tcp_ports_survive_decoding(src_port in any::<u16>(), dst_port in any::<u16>()) {
                let frame = tcp([10, 0, 0, 1], [10, 0, 0, 2], src_port, dst_port);
                let event = decode(&frame).unwrap();
                prop_assert_eq!(event.src_port, Some(src_port));
                prop_assert_eq!(event.dst_port, Some(dst_port));
            }
        }
    }
}
