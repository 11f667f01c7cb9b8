//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 모든 크레이트가 공유하는 데이터 구조를 정의합니다.
//! 장치 식별자([`MacAddr`]), 프로토콜 레이블([`Protocol`]),
//! 알림([`Alert`])과 그 분류([`AlertType`], [`Severity`])가 여기에 있습니다.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// MacAddr
// =============================================================================

/// 하드웨어(MAC) 주소
///
/// 모든 트래커의 안정적인 식별 키(DeviceKey)로 사용됩니다.
/// 표시 형식은 대문자 콜론 구분 (`AA:BB:CC:DD:EE:FF`)이며
/// serde 직렬화도 같은 문자열 형식을 사용합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// 모든 바이트가 0인 주소
    pub const ZERO: Self = Self([0; 6]);
    /// 브로드캐스트 주소
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// 6바이트 배열에서 생성합니다.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// 슬라이스 앞 6바이트에서 생성합니다. 길이가 부족하면 `None`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(octets))
    }

    /// 원시 바이트
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// 모든 바이트가 0인지 확인합니다.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// 브로드캐스트 주소(FF:FF:FF:FF:FF:FF)인지 확인합니다.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; 6]
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// MAC 주소 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0}")]
pub struct MacParseError(pub String);

impl FromStr for MacAddr {
    type Err = MacParseError;

    /// `AA:BB:CC:DD:EE:FF` 또는 `aa-bb-cc-dd-ee-ff` 형식을 받습니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split([':', '-']) {
            if count == 6 || part.len() != 2 {
                return Err(MacParseError(s.to_owned()));
            }
            octets[count] =
                u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_owned()))?;
            count += 1;
        }
        if count != 6 {
            return Err(MacParseError(s.to_owned()));
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Protocol
// =============================================================================

/// 디코더가 부여하는 프로토콜 레이블
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "ARP")]
    Arp,
    #[serde(rename = "ICMP")]
    Icmp,
    #[serde(rename = "ICMPv6")]
    Icmpv6,
    Unknown,
}

impl Protocol {
    /// 표시용 레이블
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Arp => "ARP",
            Self::Icmp => "ICMP",
            Self::Icmpv6 => "ICMPv6",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적: 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 메트릭 레이블용 소문자 이름
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

// =============================================================================
// AlertType
// =============================================================================

/// 알림 분류
///
/// 디스패처는 타입별로 서로 다른 쿨다운 간격을 적용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NewDevice,
    ArpSpoofing,
    MalwareCritical,
    PortScan,
    SuspiciousPort,
    TrafficVolume,
    MalformedPacket,
    BandwidthThreshold,
    QuotaWarning,
    QuotaExceeded,
    SuspiciousTraffic,
}

impl AlertType {
    /// 모든 알림 타입
    pub const ALL: [AlertType; 11] = [
        Self::NewDevice,
        Self::ArpSpoofing,
        Self::MalwareCritical,
        Self::PortScan,
        Self::SuspiciousPort,
        Self::TrafficVolume,
        Self::MalformedPacket,
        Self::BandwidthThreshold,
        Self::QuotaWarning,
        Self::QuotaExceeded,
        Self::SuspiciousTraffic,
    ];

    /// 직렬화 이름과 같은 snake_case 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewDevice => "new_device",
            Self::ArpSpoofing => "arp_spoofing",
            Self::MalwareCritical => "malware_critical",
            Self::PortScan => "port_scan",
            Self::SuspiciousPort => "suspicious_port",
            Self::TrafficVolume => "traffic_volume",
            Self::MalformedPacket => "malformed_packet",
            Self::BandwidthThreshold => "bandwidth_threshold",
            Self::QuotaWarning => "quota_warning",
            Self::QuotaExceeded => "quota_exceeded",
            Self::SuspiciousTraffic => "suspicious_traffic",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Alert
// =============================================================================

/// 보안 알림
///
/// 탐지기와 집계기가 생성하고 디스패처가 소비합니다.
/// 필수 필드는 [`Alert::new`]로, 선택 필드는 `with_*` 빌더 메서드로 채웁니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 ID (UUID v4)
    pub id: String,
    /// 알림 분류
    pub alert_type: AlertType,
    /// 심각도
    pub severity: Severity,
    /// 제목
    pub title: String,
    /// 상세 메시지
    pub message: String,
    /// 출발지 하드웨어 주소
    pub source_mac: Option<MacAddr>,
    /// 출발지 네트워크 주소
    pub source_ip: Option<IpAddr>,
    /// 목적지 네트워크 주소
    pub destination_ip: Option<IpAddr>,
    /// 관련 포트 (포트 기반 알림만)
    pub port: Option<u16>,
    /// 연결된 장치 ID (장치 해석기가 알고 있는 경우)
    pub device_id: Option<String>,
    /// 연결된 장치 이름
    pub device_name: Option<String>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// 현재 시각으로 새 알림을 생성합니다.
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type,
            severity,
            title: title.into(),
            message: message.into(),
            source_mac: None,
            source_ip: None,
            destination_ip: None,
            port: None,
            device_id: None,
            device_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_source_mac(mut self, mac: MacAddr) -> Self {
        self.source_mac = Some(mac);
        self
    }

    pub fn with_source_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.source_ip = ip;
        self
    }

    pub fn with_destination_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.destination_ip = ip;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_device(mut self, id: Option<String>, name: Option<String>) -> Self {
        self.device_id = id;
        self.device_name = name;
        self
    }

    /// 생성 시각을 지정합니다 (패킷 타임스탬프 기준 알림).
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// 출발지 식별자 (하드웨어 주소 우선, 없으면 네트워크 주소)
    pub fn source_identity(&self) -> Option<String> {
        self.source_mac
            .map(|m| m.to_string())
            .or_else(|| self.source_ip.map(|ip| ip.to_string()))
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({})",
            self.severity, self.title, self.alert_type,
        )
    }
}
