//! 패킷 이벤트: 파이프라인을 흐르는 기본 단위
//!
//! 디코더는 관측된 프레임마다 [`PacketEvent`]를 한 번 생성하고,
//! 이후 모든 탐지기와 집계기는 이 불변 이벤트를 공유(`Arc`)하여 읽기만 합니다.
//! 디코딩 중 점진적으로 필드를 채우는 작업은 [`PacketEventBuilder`]가 담당합니다.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MacAddr, Protocol};

// --- 모듈명 상수 ---

/// 패킷 엔진 모듈명
pub const MODULE_PACKET_ENGINE: &str = "packet-engine";
/// 텔레메트리 모듈명
pub const MODULE_TELEMETRY: &str = "telemetry";
/// 알림 디스패처 모듈명
pub const MODULE_ALERT_DISPATCHER: &str = "alert-dispatcher";

/// ARP 오퍼레이션 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArpOperation {
    Request,
    Reply,
    Other(u16),
}

impl From<u16> for ArpOperation {
    fn from(code: u16) -> Self {
        match code {
            1 => Self::Request,
            2 => Self::Reply,
            other => Self::Other(other),
        }
    }
}

/// 관측된 프레임 하나에 대한 디코딩 결과
///
/// ARP 프레임의 경우 `src_ip`/`dst_ip`는 ARP sender/target 프로토콜 주소이며
/// `arp_operation`이 채워집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketEvent {
    /// 출발지 하드웨어 주소
    pub src_mac: MacAddr,
    /// 목적지 하드웨어 주소
    pub dst_mac: MacAddr,
    /// 출발지 네트워크 주소
    pub src_ip: Option<IpAddr>,
    /// 목적지 네트워크 주소
    pub dst_ip: Option<IpAddr>,
    /// 출발지 포트
    pub src_port: Option<u16>,
    /// 목적지 포트
    pub dst_port: Option<u16>,
    /// 프로토콜 레이블
    pub protocol: Protocol,
    /// ARP 오퍼레이션 (ARP 프레임만)
    pub arp_operation: Option<ArpOperation>,
    /// 프레임 길이 (바이트)
    pub size: usize,
    /// 원시 프레임 (보관하도록 설정된 경우)
    #[serde(skip)]
    pub raw: Option<Bytes>,
    /// 캡처 시각
    pub timestamp: DateTime<Utc>,
}

impl PacketEvent {
    /// 하드웨어 주소만 가진 최소 이벤트를 시작하는 빌더를 만듭니다.
    pub fn builder(src_mac: MacAddr, dst_mac: MacAddr, size: usize) -> PacketEventBuilder {
        PacketEventBuilder::new(src_mac, dst_mac, size)
    }

    /// ARP 프레임 여부
    pub fn is_arp(&self) -> bool {
        self.protocol == Protocol::Arp
    }

    /// 출발지 네트워크 주소가 0.0.0.0인지 확인합니다.
    pub fn has_unspecified_ipv4_source(&self) -> bool {
        matches!(self.src_ip, Some(IpAddr::V4(ip)) if ip == Ipv4Addr::UNSPECIFIED)
    }
}

impl fmt::Display for PacketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.protocol, self.src_mac, self.dst_mac)?;
        if let (Some(src), Some(dst)) = (self.src_ip, self.dst_ip) {
            write!(f, " ({src}")?;
            if let Some(p) = self.src_port {
                write!(f, ":{p}")?;
            }
            write!(f, " -> {dst}")?;
            if let Some(p) = self.dst_port {
                write!(f, ":{p}")?;
            }
            write!(f, ")")?;
        }
        write!(f, " size={}", self.size)
    }
}

/// 한 번의 디코딩 호출 동안만 사용되는 [`PacketEvent`] 빌더
///
/// 계층별 파싱이 진행될수록 필드를 채우며, 중간에 실패하면
/// 그때까지 채운 값만으로 최소 이벤트를 만들 수 있습니다.
#[derive(Debug, Clone)]
pub struct PacketEventBuilder {
    event: PacketEvent,
}

impl PacketEventBuilder {
    pub fn new(src_mac: MacAddr, dst_mac: MacAddr, size: usize) -> Self {
        Self {
            event: PacketEvent {
                src_mac,
                dst_mac,
                src_ip: None,
                dst_ip: None,
                src_port: None,
                dst_port: None,
                protocol: Protocol::Unknown,
                arp_operation: None,
                size,
                raw: None,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn protocol(&mut self, protocol: Protocol) -> &mut Self {
        self.event.protocol = protocol;
        self
    }

    pub fn addresses(&mut self, src: IpAddr, dst: IpAddr) -> &mut Self {
        self.event.src_ip = Some(src);
        self.event.dst_ip = Some(dst);
        self
    }

    pub fn ports(&mut self, src: u16, dst: u16) -> &mut Self {
        self.event.src_port = Some(src);
        self.event.dst_port = Some(dst);
        self
    }

    pub fn arp_operation(&mut self, op: ArpOperation) -> &mut Self {
        self.event.arp_operation = Some(op);
        self
    }

    pub fn timestamp(&mut self, at: DateTime<Utc>) -> &mut Self {
        self.event.timestamp = at;
        self
    }

    pub fn raw(&mut self, raw: Bytes) -> &mut Self {
        self.event.raw = Some(raw);
        self
    }

    /// 지금까지 채운 내용으로 이벤트를 완성합니다.
    pub fn build(self) -> PacketEvent {
        self.event
    }
}
