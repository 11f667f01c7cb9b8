//! 수락된 알림의 비동기 영속화
//!
//! 디스패처 구독자는 제출 경로에서 동기적으로 호출되므로 저장소 I/O를 직접 하지 않습니다.
//! [`PersistForwarder`]가 bounded 채널에 `try_send`로 넘기고,
//! [`AlertPersister`] 태스크가 [`AlertStore::persist`]를 호출합니다.
//! 채널이 가득 차거나 저장이 실패해도 로그와 메트릭만 남깁니다.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lanshield_core::collab::AlertStore;
use lanshield_core::metrics as m;
use lanshield_core::types::Alert;

use crate::dispatcher::{AlertDispatcher, SubscriberId};

/// 디스패처 구독자 쪽 송신기
#[derive(Debug, Clone)]
pub struct PersistForwarder {
    tx: mpsc::Sender<Alert>,
}

impl PersistForwarder {
    /// 용량 `capacity`의 영속화 채널을 만듭니다. 0은 1로 올립니다.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// 블로킹 없이 알림을 넘깁니다. 넘기지 못하면 `false`입니다.
    pub fn forward(&self, alert: &Alert) -> bool {
        match self.tx.try_send(alert.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                warn!(alert_id = %alert.id, "persist channel full, alert not stored");
                metrics::counter!(m::DISPATCHER_PERSIST_FAILURES_TOTAL).increment(1);
                false
            }
            Err(TrySendError::Closed(alert)) => {
                debug!(alert_id = %alert.id, "persister stopped, alert not stored");
                false
            }
        }
    }
}

/// 영속화 채널을 비우며 저장소에 기록하는 태스크 본체
pub struct AlertPersister {
    store: Arc<dyn AlertStore>,
    rx: mpsc::Receiver<Alert>,
}

impl AlertPersister {
    pub fn new(store: Arc<dyn AlertStore>, rx: mpsc::Receiver<Alert>) -> Self {
        Self { store, rx }
    }

    /// 채널이 닫히거나 `cancel`이 발동할 때까지 저장합니다.
    ///
    /// 취소되면 이미 채널에 들어온 알림까지 저장한 뒤 반환합니다.
    /// 반환값은 저장에 성공한 알림 수입니다.
    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        let mut stored = 0;
        loop {
            tokio::select! {
                biased;
                maybe = self.rx.recv() => match maybe {
                    Some(alert) => stored += self.store_one(alert).await,
                    None => break,
                },
                () = cancel.cancelled() => {
                    self.rx.close();
                    while let Some(alert) = self.rx.recv().await {
                        stored += self.store_one(alert).await;
                    }
                    break;
                }
            }
        }
        info!(stored, "alert persister stopped");
        stored
    }

    async fn store_one(&self, alert: Alert) -> u64 {
        let id = alert.id.clone();
        match self.store.persist(alert).await {
            Ok(()) => 1,
            Err(e) => {
                warn!(alert_id = %id, error = %e, "failed to persist alert");
                metrics::counter!(m::DISPATCHER_PERSIST_FAILURES_TOTAL).increment(1);
                0
            }
        }
    }
}

impl AlertDispatcher {
    /// 수락된 알림을 `store`에 저장하는 내부 구독자를 등록합니다.
    ///
    /// 반환된 [`AlertPersister`]는 호출자가 태스크로 띄워야 합니다.
    pub fn attach_persister(&self, store: Arc<dyn AlertStore>) -> (SubscriberId, AlertPersister) {
        let (forwarder, rx) = PersistForwarder::channel(self.config().persist_channel_capacity);
        let id = self.subscribe("persister", move |alert| {
            forwarder.forward(alert);
        });
        (id, AlertPersister::new(store, rx))
    }
}
