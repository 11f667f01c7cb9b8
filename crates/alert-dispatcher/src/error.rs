//! 디스패처 에러 타입

use lanshield_core::error::{ConfigError, LanshieldError};

/// 알림 디스패처 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// 잘못된 디스패처 설정
    #[error("invalid dispatcher setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

impl From<DispatcherError> for LanshieldError {
    fn from(err: DispatcherError) -> Self {
        match err {
            DispatcherError::InvalidSetting { field, reason } => {
                LanshieldError::Config(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason,
                })
            }
        }
    }
}
