//! 텔레메트리 에러 타입

use lanshield_core::error::{ConfigError, LanshieldError};

/// 텔레메트리 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// 집계기 구성 값이 유효하지 않음
    #[error("invalid telemetry setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

impl From<TelemetryError> for LanshieldError {
    fn from(err: TelemetryError) -> Self {
        match err {
            TelemetryError::InvalidSetting { field, reason } => {
                LanshieldError::Config(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason,
                })
            }
        }
    }
}
