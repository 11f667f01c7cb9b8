//! 네트워크 건강 점수
//!
//! 100점에서 시작해 최근 1시간 Critical 의심 활동마다 20점, Warning마다 5점,
//! 프로토콜을 알 수 없는 연결 비율에 따라 최대 30점을 뺍니다. 결과는 0~100으로 자릅니다.

use serde::{Deserialize, Serialize};

const CRITICAL_PENALTY: i64 = 20;
const WARNING_PENALTY: i64 = 5;
const UNKNOWN_PROTOCOL_MAX_PENALTY: f64 = 30.0;

/// 점수 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::Excellent,
            70..=89 => Self::Good,
            50..=69 => Self::Fair,
            30..=49 => Self::Poor,
            _ => Self::Critical,
        }
    }
}

/// 건강 점수 조회 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkHealth {
    pub score: u8,
    pub band: HealthBand,
    pub critical_events_last_hour: usize,
    pub warning_events_last_hour: usize,
    pub unknown_protocol_ratio: f64,
    pub active_connections: usize,
    pub packets_per_sec: f64,
    pub bytes_per_sec: f64,
}

pub(crate) fn health_score(critical: usize, warning: usize, unknown_ratio: f64) -> u8 {
    let critical = i64::try_from(critical).unwrap_or(i64::MAX);
    let warning = i64::try_from(warning).unwrap_or(i64::MAX);
    let unknown = (unknown_ratio.clamp(0.0, 1.0) * UNKNOWN_PROTOCOL_MAX_PENALTY).round() as i64;
    let score = 100i64
        .saturating_sub(critical.saturating_mul(CRITICAL_PENALTY))
        .saturating_sub(warning.saturating_mul(WARNING_PENALTY))
        .saturating_sub(unknown);
    score.clamp(0, 100) as u8
}
