//! 알림 디스패처: 수락/억제 게이트, 최근 알림 버퍼, 구독자 fan-out
//!
//! # 제출 흐름
//! ```text
//! submit(alert)
//!   -> DedupKey + 타입별 쿨다운
//!   -> CooldownTable::claim (키 단위 원자적)
//!        거부: suppressed += 1
//!        수락: 링 버퍼 push -> 구독자 호출 -> sent += 1
//! ```
//!
//! `total`은 따로 세지 않고 `sent + suppressed`로 계산하므로
//! 어느 시점에 읽어도 불변식이 깨지지 않습니다.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info};

use lanshield_core::config::DispatcherConfig;
use lanshield_core::metrics as m;
use lanshield_core::types::Alert;

use crate::dedup::{CooldownTable, DedupKey, to_time_delta};
use crate::error::DispatcherError;

type Callback = Arc<dyn Fn(&Alert) + Send + Sync>;

/// 구독 해제에 쓰는 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    name: String,
    callback: Callback,
}

/// 제출 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted,
    Suppressed,
}

impl DispatchOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// 디스패처 통계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub total: u64,
    pub sent: u64,
    pub suppressed: u64,
    pub active_cooldowns: usize,
}

/// 알림 디스패처
///
/// `Arc`로 감싸 여러 생산자가 공유합니다. 모든 메서드는 `&self`입니다.
pub struct AlertDispatcher {
    config: DispatcherConfig,
    cooldowns: CooldownTable,
    recent: Mutex<VecDeque<Alert>>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
    sent: AtomicU64,
    suppressed: AtomicU64,
}

impl AlertDispatcher {
    /// 디스패처를 생성합니다.
    ///
    /// # 에러
    /// `recent_capacity`가 0이면 [`DispatcherError::InvalidSetting`]을 반환합니다.
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatcherError> {
        if config.recent_capacity == 0 {
            return Err(DispatcherError::InvalidSetting {
                field: "dispatcher.recent_capacity",
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(Self {
            recent: Mutex::new(VecDeque::with_capacity(config.recent_capacity)),
            config,
            cooldowns: CooldownTable::new(),
            subscribers: RwLock::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            sent: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // ─── 구독 ──────────────────────────────────────────────────────

    /// 수락된 알림을 받을 콜백을 등록합니다. 등록 순서대로 호출됩니다.
    ///
    /// 콜백은 제출한 태스크에서 동기적으로 실행되므로 오래 걸리는 작업은
    /// 채널로 넘겨야 합니다.
    pub fn subscribe<F>(&self, name: impl Into<String>, callback: F) -> SubscriberId
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        debug!(subscriber = %name, "alert subscriber registered");
        self.subscribers.write().push(Subscriber {
            id,
            name,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    // ─── 제출 ──────────────────────────────────────────────────────

    /// 현재 시각 기준으로 알림을 제출합니다.
    pub fn submit(&self, alert: Alert) -> DispatchOutcome {
        self.submit_at(alert, Utc::now())
    }

    /// 지정한 시각 기준으로 알림을 제출합니다.
    pub fn submit_at(&self, alert: Alert, now: DateTime<Utc>) -> DispatchOutcome {
        let key = DedupKey::from_alert(&alert);
        let interval = to_time_delta(self.config.cooldowns.interval(alert.alert_type));

        if !self.cooldowns.claim(key, interval, now) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(
                m::DISPATCHER_ALERTS_SUPPRESSED_TOTAL,
                m::LABEL_ALERT_TYPE => alert.alert_type.as_str()
            )
            .increment(1);
            debug!(
                alert_type = %alert.alert_type,
                source = ?alert.source_identity(),
                "alert suppressed by cooldown"
            );
            return DispatchOutcome::Suppressed;
        }

        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            title = %alert.title,
            "alert dispatched"
        );
        self.remember(alert.clone());
        self.fan_out(&alert);

        self.sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            m::DISPATCHER_ALERTS_SENT_TOTAL,
            m::LABEL_ALERT_TYPE => alert.alert_type.as_str(),
            m::LABEL_SEVERITY => alert.severity.as_label()
        )
        .increment(1);
        DispatchOutcome::Accepted
    }

    fn remember(&self, alert: Alert) {
        let mut recent = self.recent.lock();
        while recent.len() >= self.config.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(alert);
    }

    fn fan_out(&self, alert: &Alert) {
        // 콜백 안에서 subscribe를 호출해도 교착되지 않도록 목록을 복사해 둠
        let targets: Vec<(String, Callback)> = self
            .subscribers
            .read()
            .iter()
            .map(|s| (s.name.clone(), Arc::clone(&s.callback)))
            .collect();

        for (name, callback) in targets {
            if catch_unwind(AssertUnwindSafe(|| callback(alert))).is_err() {
                error!(
                    subscriber = %name,
                    alert_id = %alert.id,
                    "alert subscriber panicked"
                );
            }
        }
    }

    // ─── 조회 ──────────────────────────────────────────────────────

    /// 최신순 최근 알림 N건
    pub fn recent_notifications(&self, n: usize) -> Vec<Alert> {
        self.recent.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn stats(&self) -> DispatcherStats {
        let sent = self.sent.load(Ordering::Relaxed);
        let suppressed = self.suppressed.load(Ordering::Relaxed);
        DispatcherStats {
            total: sent + suppressed,
            sent,
            suppressed,
            active_cooldowns: self.cooldowns.len(),
        }
    }

    // ─── 유지보수 ──────────────────────────────────────────────────

    /// 타입 쿨다운의 2배보다 오래된 쿨다운 항목을 지웁니다.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cooldowns = &self.config.cooldowns;
        let removed = self
            .cooldowns
            .sweep(now, |t| to_time_delta(cooldowns.interval(t).saturating_mul(2)));
        metrics::gauge!(m::DISPATCHER_ACTIVE_COOLDOWNS).set(self.cooldowns.len() as f64);
        if removed > 0 {
            debug!(removed, remaining = self.cooldowns.len(), "cooldown sweep finished");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use lanshield_core::types::{AlertType, MacAddr, Severity};

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn dispatcher() -> AlertDispatcher {
        AlertDispatcher::new(DispatcherConfig::default()).unwrap()
    }

    fn arp_alert(last: u8) -> Alert {
        Alert::new(AlertType::ArpSpoofing, Severity::Critical, "ARP spoofing", "moved")
            .with_source_mac(MacAddr::new([2, 0, 0, 0, 0, last]))
    }

    #[test]
    fn rejects_zero_capacity() {
        let result = AlertDispatcher::new(DispatcherConfig {
            recent_capacity: 0,
            ..DispatcherConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_within_cooldown_is_suppressed() {
        let d = dispatcher();
        assert!(d.submit_at(arp_alert(1), at(0)).is_accepted());
        assert_eq!(d.submit_at(arp_alert(1), at(30)), DispatchOutcome::Suppressed);
        // 다른 출발지는 별도 키
        assert!(d.submit_at(arp_alert(2), at(30)).is_accepted());
        // ARP 쿨다운 1분 경과
        assert!(d.submit_at(arp_alert(1), at(61)).is_accepted());

        let stats = d.stats();
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.active_cooldowns, 2);
    }

    #[test]
    fn ring_keeps_newest_hundred() {
        let d = dispatcher();
        for i in 0..150u8 {
            let alert = Alert::new(AlertType::PortScan, Severity::High, format!("scan {i}"), "m")
                .with_source_mac(MacAddr::new([2, 0, 0, 0, 1, i]));
            d.submit_at(alert, at(0));
        }
        let recent = d.recent_notifications(usize::MAX);
        assert_eq!(recent.len(), 100);
        assert_eq!(recent[0].title, "scan 149");
        assert_eq!(recent[99].title, "scan 50");
        assert_eq!(d.recent_notifications(3).len(), 3);
    }

    #[test]
    fn subscribers_called_in_order_and_panics_are_isolated() {
        let d = dispatcher();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        d.subscribe("first", move |_| o.lock().push("first"));
        d.subscribe("broken", |_| panic!("subscriber failure"));
        let o = Arc::clone(&order);
        d.subscribe("last", move |_| o.lock().push("last"));

        assert!(d.submit_at(arp_alert(1), at(0)).is_accepted());
        assert_eq!(*order.lock(), vec!["first", "last"]);
        assert_eq!(d.stats().sent, 1);
    }

    #[test]
    fn suppressed_alerts_do_not_reach_subscribers() {
        let d = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let id = d.subscribe("counter", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        d.submit_at(arp_alert(1), at(0));
        d.submit_at(arp_alert(1), at(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(d.unsubscribe(id));
        assert!(!d.unsubscribe(id));
        d.submit_at(arp_alert(2), at(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_may_subscribe_from_callback() {
        let d = Arc::new(dispatcher());
        let inner = Arc::clone(&d);
        d.subscribe("registrar", move |_| {
            inner.subscribe("late", |_| {});
        });
        d.submit_at(arp_alert(1), at(0));
        assert_eq!(d.subscriber_count(), 2);
    }

    #[test]
    fn sweep_evicts_after_twice_interval() {
        let d = dispatcher();
        d.submit_at(arp_alert(1), at(0));
        let device = Alert::new(AlertType::NewDevice, Severity::Info, "New device", "joined")
            .with_source_mac(MacAddr::new([2, 0, 0, 0, 0, 9]));
        d.submit_at(device, at(0));

        assert_eq!(d.sweep(at(119)), 0);
        // ARP 2분 경과, 신규 장치는 48시간 유지
        assert_eq!(d.sweep(at(120)), 1);
        assert_eq!(d.stats().active_cooldowns, 1);
    }

    #[test]
    fn stats_serialize() {
        let d = dispatcher();
        d.submit_at(arp_alert(1), at(0));
        let json = serde_json::to_value(d.stats()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["active_cooldowns"], 1);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn total_is_sent_plus_suppressed(
                submissions in proptest::collection::vec((0u8..4, 0i64..600), 1..200),
            ) {
                let d = dispatcher();
                let mut sorted = submissions.clone();
                sorted.sort_by_key(|(_, secs)| *secs);
                for (source, secs) in sorted {
                    d.submit_at(arp_alert(source), at(secs));
                }
                let stats = d.stats();
                prop_assert_eq!(stats.total, submissions.len() as u64);
                prop_assert_eq!(stats.total, stats.sent + stats.suppressed);
                prop_assert!(stats.active_cooldowns <= 4);
            }
        }
    }
}
