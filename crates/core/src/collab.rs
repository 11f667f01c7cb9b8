//! 외부 협력자 trait
//!
//! 패킷 파이프라인이 소비하지만 소유하지 않는 서비스들입니다.
//!
//! - [`DeviceResolver`]: 하드웨어 주소 → 알려진 장치 식별 정보
//! - [`ReputationLookup`]: 네트워크 주소 → 위협 정보 (non-blocking)
//! - [`AlertStore`]: 확정된 알림의 영속화, "이미 활성" 질의
//!
//! 협력자의 실패는 파이프라인을 멈추지 않습니다. 해석 실패는 필드를 비워 두고,
//! 저장소 실패는 로그만 남기며 이미 내려진 디스패치 결정을 되돌리지 않습니다.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::pipeline::BoxFuture;
use crate::types::{Alert, AlertType, MacAddr, Severity};

/// 장치 해석 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// 장치 ID
    pub id: String,
    /// 사용자 지정 이름 (있을 경우)
    pub name: Option<String>,
}

/// 하드웨어 주소로 알려진 장치를 찾는 해석기
///
/// 패킷 경로에서 호출되므로 메모리 내 조회처럼 즉시 반환해야 합니다.
pub trait DeviceResolver: Send + Sync {
    fn resolve(&self, mac: &MacAddr) -> Option<DeviceIdentity>;
}

/// IP 평판 조회 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatInfo {
    /// 위협 분류 (예: "botnet", "scanner")
    pub category: String,
    /// 설명
    pub description: String,
    /// 심각도
    pub severity: Severity,
}

/// IP 평판 조회
///
/// 구현체는 블로킹 I/O를 하지 않아야 합니다 (캐시된 목록 조회 등).
pub trait ReputationLookup: Send + Sync {
    fn lookup(&self, ip: &IpAddr) -> Option<ThreatInfo>;
}

/// 영속 알림 저장소
pub trait AlertStore: Send + Sync {
    /// 확정된 알림을 저장합니다.
    fn persist(&self, alert: Alert) -> BoxFuture<'_, Result<(), StorageError>>;

    /// 해당 출발지에 대해 같은 타입의 활성 알림이 이미 있는지 질의합니다.
    fn has_active_alert(
        &self,
        alert_type: AlertType,
        source: String,
    ) -> BoxFuture<'_, Result<bool, StorageError>>;
}

// ─── No-op 구현 ──────────────────────────────────────────────────

/// 아무 장치도 알지 못하는 해석기
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDeviceResolver;

impl DeviceResolver for NoopDeviceResolver {
    fn resolve(&self, _mac: &MacAddr) -> Option<DeviceIdentity> {
        None
    }
}

/// 항상 "위협 없음"을 반환하는 평판 조회
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReputation;

impl ReputationLookup for NoopReputation {
    fn lookup(&self, _ip: &IpAddr) -> Option<ThreatInfo> {
        None
    }
}

/// 알림을 버리는 저장소
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlertStore;

impl AlertStore for NoopAlertStore {
    fn persist(&self, _alert: Alert) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async { Ok(()) })
    }

    fn has_active_alert(
        &self,
        _alert_type: AlertType,
        _source: String,
    ) -> BoxFuture<'_, Result<bool, StorageError>> {
        Box::pin(async { Ok(false) })
    }
}

// ─── 정적 구현 ──────────────────────────────────────────────────

/// 고정된 장치 목록 기반 해석기
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceResolver {
    devices: HashMap<MacAddr, DeviceIdentity>,
}

impl StaticDeviceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(
        mut self,
        mac: MacAddr,
        id: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        self.devices.insert(
            mac,
            DeviceIdentity {
                id: id.into(),
                name,
            },
        );
        self
    }
}

impl DeviceResolver for StaticDeviceResolver {
    fn resolve(&self, mac: &MacAddr) -> Option<DeviceIdentity> {
        self.devices.get(mac).cloned()
    }
}

/// 고정된 차단 목록 기반 평판 조회
#[derive(Debug, Clone, Default)]
pub struct StaticReputationList {
    entries: HashMap<IpAddr, ThreatInfo>,
}

impl StaticReputationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 같은 분류로 여러 주소를 등록합니다.
    pub fn from_addresses(addresses: HashSet<IpAddr>, category: &str) -> Self {
        let entries = addresses
            .into_iter()
            .map(|ip| {
                (
                    ip,
                    ThreatInfo {
                        category: category.to_owned(),
                        description: format!("{ip} is listed as {category}"),
                        severity: Severity::Critical,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, ip: IpAddr, info: ThreatInfo) {
        self.entries.insert(ip, info);
    }
}

impl ReputationLookup for StaticReputationList {
    fn lookup(&self, ip: &IpAddr) -> Option<ThreatInfo> {
        self.entries.get(ip).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_resolver_knows_nothing() {
        assert!(NoopDeviceResolver.resolve(&MacAddr::ZERO).is_none());
        assert!(NoopReputation.lookup(&"1.2.3.4".parse().unwrap()).is_none());
    }

    #[tokio::test]
    async fn noop_store_accepts_everything() {
        let store = NoopAlertStore;
        let alert = Alert::new(AlertType::PortScan, Severity::High, "t", "m");
        store.persist(alert).await.unwrap();
        assert!(
            !store
                .has_active_alert(AlertType::PortScan, "10.0.0.1".to_owned())
                .await
                .unwrap()
        );
    }

    #[test]
    fn static_resolver_returns_registered_device() {
        let mac = MacAddr::new([0xaa, 0xbb, 0xcc, 0, 0, 1]);
        let resolver =
            StaticDeviceResolver::new().with_device(mac, "dev-1", Some("living-room-tv".to_owned()));
        let identity = resolver.resolve(&mac).unwrap();
        assert_eq!(identity.id, "dev-1");
        assert_eq!(identity.name.as_deref(), Some("living-room-tv"));
        assert!(resolver.resolve(&MacAddr::ZERO).is_none());
    }

    #[test]
    fn static_reputation_list_matches_listed_addresses() {
        let bad: IpAddr = "203.0.113.9".parse().unwrap();
        let list = StaticReputationList::from_addresses(HashSet::from([bad]), "botnet");
        let info = list.lookup(&bad).unwrap();
        assert_eq!(info.category, "botnet");
        assert_eq!(info.severity, Severity::Critical);
        assert!(list.lookup(&"203.0.113.10".parse().unwrap()).is_none());
    }
}
