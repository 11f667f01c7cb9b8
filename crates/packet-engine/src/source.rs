//! 패킷 소스: 캡처 루프 → 프로세스 내 이벤트 버스
//!
//! 캡처 읽기는 블로킹이므로 전용 OS 스레드에서 돌립니다. 스레드는 프레임을 디코딩해
//! 제한된 `tokio::mpsc` 채널로 `blocking_send` 합니다 (버스가 가득 차면 기다리며,
//! 조용히 버리지 않습니다).
//!
//! # 종료 조건
//! - 취소 토큰이 발동됨 (읽기 타임아웃마다 확인)
//! - 수신자가 닫힘
//! - 장치가 닫힘 ([`CaptureError::Closed`])
//! - 연속 읽기 에러가 [`MAX_CONSECUTIVE_READ_ERRORS`]에 도달
//!
//! # 사용 예시
//! ```ignore
//! let (mut source, event_rx) = PacketSource::builder()
//!     .config(config.capture.clone())
//!     .backend(default_backend())
//!     .build()?;
//!
//! source.start().await?;
//! while let Some(event) = event_rx.recv().await { /* ... */ }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lanshield_core::config::CaptureConfig;
use lanshield_core::error::{CaptureError, LanshieldError, PipelineError};
use lanshield_core::event::PacketEvent;
use lanshield_core::metrics as m;
use lanshield_core::pipeline::{HealthStatus, Pipeline};

use crate::capture::{CaptureBackend, CaptureDevice, default_backend};
use crate::decoder::PacketDecoder;
use crate::error::PacketEngineError;

/// 캡처 루프를 포기하기 전까지 허용하는 연속 읽기 에러 수
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 100;

/// 읽기 에러 후 재시도 전 대기 시간
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// 캡처 루프 카운터
#[derive(Debug, Default)]
pub struct SourceStats {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    read_errors: AtomicU64,
    failed: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// [`SourceStats`]의 직렬화 가능한 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStatsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub read_errors: u64,
    pub failed: bool,
    pub last_error: Option<String>,
}

impl SourceStats {
    pub fn snapshot(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }

    fn record_failure(&self, reason: String) {
        self.failed.store(true, Ordering::Relaxed);
        *self.last_error.lock() = Some(reason);
    }
}

/// 패킷 소스 빌더
///
/// `build()`는 `(PacketSource, mpsc::Receiver<PacketEvent>)`를 반환합니다.
pub struct PacketSourceBuilder {
    config: Option<CaptureConfig>,
    backend: Option<Arc<dyn CaptureBackend>>,
}

impl PacketSourceBuilder {
    fn new() -> Self {
        Self {
            config: None,
            backend: None,
        }
    }

    /// 캡처 설정을 지정합니다.
    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 캡처 백엔드를 지정합니다 (기본: [`default_backend`]).
    pub fn backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 소스와 이벤트 수신 채널을 생성합니다.
    ///
    /// # 에러
    /// - `PacketEngineError::Setup`: 설정 누락 또는 채널 용량 0
    pub fn build(self) -> Result<(PacketSource, mpsc::Receiver<PacketEvent>), PacketEngineError> {
        let config = self
            .config
            .ok_or_else(|| PacketEngineError::Setup("capture config is required".to_owned()))?;
        if config.channel_capacity == 0 {
            return Err(PacketEngineError::Setup(
                "channel capacity must be greater than 0".to_owned(),
            ));
        }
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let decoder = PacketDecoder::new().keep_raw(config.keep_raw);

        let source = PacketSource {
            config,
            backend: self.backend.unwrap_or_else(default_backend),
            decoder,
            event_tx: Some(event_tx),
            cancel: CancellationToken::new(),
            stats: Arc::new(SourceStats::default()),
            thread: None,
        };
        Ok((source, event_rx))
    }
}

/// 캡처 루프를 소유하는 패킷 소스
pub struct PacketSource {
    config: CaptureConfig,
    backend: Arc<dyn CaptureBackend>,
    decoder: PacketDecoder,
    /// 시작 시 캡처 스레드로 이동합니다.
    event_tx: Option<mpsc::Sender<PacketEvent>>,
    cancel: CancellationToken,
    stats: Arc<SourceStats>,
    thread: Option<JoinHandle<()>>,
}

impl PacketSource {
    /// 빌더를 반환합니다.
    pub fn builder() -> PacketSourceBuilder {
        PacketSourceBuilder::new()
    }

    /// 캡처 카운터
    pub fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }

    /// 캡처 루프 취소 토큰
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 캡처 스레드가 살아 있는지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// 장치를 열고 캡처 스레드를 띄웁니다.
    ///
    /// 장치 열기 실패는 [`CaptureError::Open`]으로 반환됩니다.
    pub fn spawn(&mut self) -> Result<(), PacketEngineError> {
        if self.thread.is_some() {
            return Err(PacketEngineError::Setup("capture already started".to_owned()));
        }
        let tx = self
            .event_tx
            .take()
            .ok_or_else(|| PacketEngineError::Setup("event channel already consumed".to_owned()))?;

        let device = match self.backend.open(&self.config) {
            Ok(device) => device,
            Err(e) => {
                // 재시도할 수 있도록 송신자를 되돌려 둡니다.
                self.event_tx = Some(tx);
                self.stats.record_failure(e.to_string());
                return Err(e.into());
            }
        };
        info!(
            interface = device.name(),
            promiscuous = self.config.promiscuous,
            snaplen = self.config.snaplen,
            "capture device opened"
        );

        let decoder = self.decoder;
        let cancel = self.cancel.clone();
        let stats = Arc::clone(&self.stats);
        let handle = std::thread::Builder::new()
            .name("lanshield-capture".to_owned())
            .spawn(move || capture_loop(device, decoder, tx, cancel, stats))
            .map_err(PacketEngineError::ThreadSpawn)?;
        self.thread = Some(handle);
        Ok(())
    }

    /// 캡처 루프를 취소하고 스레드가 끝날 때까지 기다립니다.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.thread.take() {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!("capture thread panicked"),
                Err(e) => warn!(error = %e, "failed to join capture thread"),
            }
        }
    }
}

impl Pipeline for PacketSource {
    async fn start(&mut self) -> Result<(), LanshieldError> {
        if self.thread.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        info!(interface = self.config.interface.as_str(), "starting packet source");
        self.spawn()?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LanshieldError> {
        if self.thread.is_none() {
            return Err(PipelineError::NotRunning.into());
        }
        info!("stopping packet source");
        self.shutdown().await;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let snapshot = self.stats.snapshot();
        if snapshot.failed {
            let reason = snapshot.last_error.unwrap_or_else(|| "unknown error".to_owned());
            return HealthStatus::Degraded(format!("capture unavailable: {reason}"));
        }
        if self.thread.is_none() {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        if !self.is_running() && !self.cancel.is_cancelled() {
            return HealthStatus::Degraded("capture loop exited".to_owned());
        }
        HealthStatus::Healthy
    }
}

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    decoder: PacketDecoder,
    tx: mpsc::Sender<PacketEvent>,
    cancel: CancellationToken,
    stats: Arc<SourceStats>,
) {
    let mut consecutive_errors = 0u32;

    while !cancel.is_cancelled() {
        let frame = match device.next_frame() {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                frame
            }
            // 읽기 타임아웃: 취소 여부만 다시 확인
            Ok(None) => continue,
            Err(CaptureError::Closed) => {
                info!(interface = device.name(), "capture device closed");
                break;
            }
            Err(e) => {
                stats.read_errors.fetch_add(1, Ordering::Relaxed);
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    warn!(error = %e, consecutive_errors, "giving up on capture device");
                    stats.record_failure(e.to_string());
                    break;
                }
                debug!(error = %e, "capture read failed");
                std::thread::sleep(READ_ERROR_BACKOFF);
                continue;
            }
        };

        stats.frames_captured.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::CAPTURE_FRAMES_TOTAL).increment(1);

        let Some(mut event) = decoder.decode_at(&frame.data, frame.timestamp) else {
            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::CAPTURE_FRAMES_DROPPED_TOTAL).increment(1);
            debug!(len = frame.data.len(), "dropping undecodable frame");
            continue;
        };
        event.size = frame.original_len.max(frame.data.len());

        if tx.blocking_send(event).is_err() {
            debug!("event bus closed, stopping capture loop");
            break;
        }
    }

    debug!("capture loop exited");
}
