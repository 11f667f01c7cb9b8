//! 파이프라인 trait: 모듈 생명주기 정의
//!
//! 데몬이 관리하는 각 서브시스템(패킷 수집, 집계기 유지보수, 디스패처 스윕)은
//! [`Pipeline`]을 구현합니다. 데몬은 서로 다른 구현을 한 레지스트리에 담기 위해
//! 객체 안전한 [`DynPipeline`]을 사용하며, 모든 [`Pipeline`]은 blanket impl로
//! 자동으로 [`DynPipeline`]이 됩니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::LanshieldError;

/// `Send` boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 부분 기능 저하 (프로세스는 계속 동작)
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 모듈 생명주기 trait
///
/// `start`는 백그라운드 태스크를 띄우고 즉시 반환해야 하며,
/// `stop`은 태스크가 정리될 때까지 기다린 뒤 반환합니다.
pub trait Pipeline: Send + Sync {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LanshieldError>> + Send;

    /// 모듈을 정지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LanshieldError>> + Send;

    /// 현재 건강 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// [`Pipeline`]의 객체 안전 버전
pub trait DynPipeline: Send + Sync {
    fn start(&mut self) -> BoxFuture<'_, Result<(), LanshieldError>>;
    fn stop(&mut self) -> BoxFuture<'_, Result<(), LanshieldError>>;
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), LanshieldError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), LanshieldError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
