#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`decoder`]: 링크 계층 프레임 → [`PacketEvent`](lanshield_core::PacketEvent) 순수 디코더
//! - [`capture`]: 캡처 장치 추상화와 libpcap 백엔드 (`pcap` 기능)
//! - [`source`]: 전용 스레드 캡처 루프, bounded mpsc 버스로 이벤트 전달
//! - [`detector`]: 다섯 가지 상태 기반 이상 탐지기와 장애 격리 실행기
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! CaptureDevice --(OS thread)--> PacketDecoder --blocking_send--> mpsc bus
//!                                                                    |
//!                                         DetectorSet (JoinSet per packet)
//! ```

pub mod capture;
pub mod decoder;
pub mod detector;
pub mod error;
pub mod source;

// --- 주요 타입 re-export ---

// 디코더
pub use decoder::{PacketDecoder, decode};

// 캡처
pub use capture::{CaptureBackend, CaptureDevice, RawFrame, UnavailableBackend, default_backend};

// 소스
pub use source::{PacketSource, PacketSourceBuilder, SourceStats, SourceStatsSnapshot};

// 탐지기
pub use detector::{
    ArpSpoofDetector, DetectorFailures, DetectorSet, MalformedPacketDetector, PacketDetector,
    PortScanDetector, SuspiciousPortDetector, TrafficVolumeDetector,
};

// 에러
pub use error::PacketEngineError;
