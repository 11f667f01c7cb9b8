//! 중복 제거 키와 쿨다운 테이블
//!
//! [`CooldownTable::claim`]은 DashMap entry API로 키가 속한 shard를 잠근 채
//! 마지막 수락 시각을 비교하고 갱신하므로, 같은 키에 대한 동시 제출 중
//! 정확히 하나만 수락됩니다.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use lanshield_core::types::{Alert, AlertType};

/// 쿨다운 비교에 쓰는 최대 간격 (100년)
const MAX_INTERVAL_SECS: i64 = 100 * 365 * 86_400;

/// 알림 중복 제거 키
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DedupKey {
    pub alert_type: AlertType,
    /// 하드웨어 주소 우선, 없으면 네트워크 주소
    pub source: Option<String>,
    pub port: Option<u16>,
    pub device_id: Option<String>,
}

impl DedupKey {
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_type: alert.alert_type,
            source: alert.source_identity(),
            port: alert.port,
            device_id: alert.device_id.clone(),
        }
    }
}

/// `std::time::Duration`을 chrono 간격으로 바꿉니다 (100년으로 자름).
pub(crate) fn to_time_delta(interval: Duration) -> TimeDelta {
    let secs = i64::try_from(interval.as_secs())
        .unwrap_or(i64::MAX)
        .min(MAX_INTERVAL_SECS);
    TimeDelta::seconds(secs)
}

/// 키별 마지막 수락 시각
#[derive(Debug, Default)]
pub struct CooldownTable {
    entries: DashMap<DedupKey, DateTime<Utc>>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 쿨다운이 지났으면 `now`로 갱신하고 `true`를 반환합니다.
    pub fn claim(&self, key: DedupKey, interval: TimeDelta, now: DateTime<Utc>) -> bool {
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < interval {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// `keep_for(타입)`보다 오래된 항목을 지우고 지운 개수를 반환합니다.
    pub fn sweep<F>(&self, now: DateTime<Utc>, keep_for: F) -> usize
    where
        F: Fn(AlertType) -> TimeDelta,
    {
        let before = self.entries.len();
        self.entries
            .retain(|key, last| now - *last < keep_for(key.alert_type));
        before.saturating_sub(self.entries.len())
    }

    pub fn last_accepted(&self, key: &DedupKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| *e.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
