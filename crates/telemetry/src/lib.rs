#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`bandwidth`]: 장치별 다중 해상도 대역폭 집계, 임계값/할당량 평가
//! - [`traffic`]: 연결 테이블, 프로토콜 분포, 상위 발신자, 의심 활동, 건강 점수
//! - [`error`]: 도메인 에러 타입

pub mod bandwidth;
pub mod error;
pub mod traffic;

// --- 주요 타입 re-export ---

// 대역폭
pub use bandwidth::{BandwidthAggregator, DeviceBandwidth, NetworkSummary};

// 트래픽 텔레메트리
pub use traffic::{
    ActivityLevel, ConnectionInfo, FlowKey, HealthBand, HourlyTraffic, NetworkHealth, ProtocolStats,
    SuspiciousActivity, TopTalker, TrafficTelemetry,
};

// 에러
pub use error::TelemetryError;
