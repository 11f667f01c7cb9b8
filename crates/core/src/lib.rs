#![doc = include_str!("../README.md")]

pub mod collab;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    CaptureError, ConfigError, DetectionError, LanshieldError, PipelineError, StorageError,
};

// 설정
pub use config::LanshieldConfig;

// 이벤트
pub use event::{ArpOperation, PacketEvent, PacketEventBuilder};

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};

// 협력자 trait
pub use collab::{AlertStore, DeviceIdentity, DeviceResolver, ReputationLookup, ThreatInfo};

// 도메인 타입
pub use types::{Alert, AlertType, MacAddr, Protocol, Severity};
