//! 패킷 엔진 에러 타입

use lanshield_core::error::{CaptureError, DetectionError, LanshieldError, PipelineError};

/// 패킷 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PacketEngineError {
    /// 캡처 장치 에러
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// 탐지기 에러
    #[error(transparent)]
    Detection(#[from] DetectionError),

    /// 캡처 스레드 생성 실패
    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// 잘못된 엔진 구성
    #[error("invalid engine setup: {0}")]
    Setup(String),
}

impl From<PacketEngineError> for LanshieldError {
    fn from(err: PacketEngineError) -> Self {
        match err {
            PacketEngineError::Capture(e) => LanshieldError::Capture(e),
            PacketEngineError::Detection(e) => LanshieldError::Detection(e),
            PacketEngineError::ThreadSpawn(e) => LanshieldError::Io(e),
            PacketEngineError::Setup(reason) => {
                LanshieldError::Pipeline(PipelineError::InitFailed(reason))
            }
        }
    }
}
