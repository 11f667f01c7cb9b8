#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`dedup`]: 중복 제거 키와 쿨다운 테이블
//! - [`dispatcher`]: 수락/억제 게이트, 최근 알림 버퍼, 구독자 fan-out
//! - [`persist`]: 수락된 알림의 비동기 영속화
//! - [`error`]: 도메인 에러 타입

pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod persist;

// --- 주요 타입 re-export ---

pub use dedup::{CooldownTable, DedupKey};
pub use dispatcher::{AlertDispatcher, DispatchOutcome, DispatcherStats, SubscriberId};
pub use error::DispatcherError;
pub use persist::{AlertPersister, PersistForwarder};
