//! 캡처 장치 추상화
//!
//! [`CaptureBackend`]는 설정으로부터 장치를 열고, [`CaptureDevice`]는 블로킹 읽기로
//! [`RawFrame`]을 하나씩 돌려줍니다. 읽기 타임아웃은 에러가 아니라 `Ok(None)`입니다.
//!
//! libpcap 구현([`PcapBackend`])은 `pcap` 기능을 켰을 때만 포함됩니다.
//! 기능이 꺼져 있으면 [`default_backend`]는 항상 열기에 실패하는 백엔드를 돌려주며,
//! 데몬은 이를 "capture unavailable" 저하 상태로 보고합니다.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use lanshield_core::config::CaptureConfig;
use lanshield_core::error::CaptureError;

/// 캡처된 링크 계층 프레임
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// 캡처된 바이트 (snaplen으로 잘렸을 수 있음)
    pub data: Bytes,
    /// 캡처 시각
    pub timestamp: DateTime<Utc>,
    /// 회선상의 원래 길이
    pub original_len: usize,
}

impl RawFrame {
    pub fn new(data: impl Into<Bytes>, timestamp: DateTime<Utc>) -> Self {
        let data = data.into();
        let original_len = data.len();
        Self {
            data,
            timestamp,
            original_len,
        }
    }
}

/// 열린 캡처 장치
///
/// 전용 OS 스레드에서만 호출되므로 `Sync`는 요구하지 않습니다.
pub trait CaptureDevice: Send {
    /// 장치 이름
    fn name(&self) -> &str;

    /// 다음 프레임을 읽습니다. 타임아웃이면 `Ok(None)`.
    ///
    /// [`CaptureError::Closed`]는 더 이상 읽을 프레임이 없음을 뜻합니다.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;
}

/// 캡처 장치 팩토리
pub trait CaptureBackend: Send + Sync {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// 빌드 구성에 맞는 기본 백엔드
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(feature = "pcap")]
    {
        Arc::new(PcapBackend)
    }
    #[cfg(not(feature = "pcap"))]
    {
        Arc::new(UnavailableBackend)
    }
}

/// 캡처 지원 없이 빌드된 경우의 백엔드
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBackend;

impl CaptureBackend for UnavailableBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        Err(CaptureError::Open {
            device: config.interface.clone(),
            reason: "built without pcap support".to_owned(),
        })
    }
}

#[cfg(feature = "pcap")]
pub use self::pcap_backend::{PcapBackend, PcapDevice};

#[cfg(feature = "pcap")]
mod pcap_backend {
    use super::*;

    /// libpcap 백엔드
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PcapBackend;

    impl CaptureBackend for PcapBackend {
        fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            let open_err = |e: pcap::Error| CaptureError::Open {
                device: config.interface.clone(),
                reason: e.to_string(),
            };
            let capture = pcap::Capture::from_device(config.interface.as_str())
                .map_err(open_err)?
                .promisc(config.promiscuous)
                .snaplen(i32::try_from(config.snaplen).unwrap_or(i32::MAX))
                .timeout(i32::try_from(config.read_timeout_ms).unwrap_or(i32::MAX))
                .open()
                .map_err(open_err)?;
            Ok(Box::new(PcapDevice {
                name: config.interface.clone(),
                capture,
            }))
        }
    }

    /// libpcap 활성 캡처 핸들
    pub struct PcapDevice {
        name: String,
        capture: pcap::Capture<pcap::Active>,
    }

    impl CaptureDevice for PcapDevice {
        fn name(&self) -> &str {
            &self.name
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
            match self.capture.next_packet() {
                Ok(packet) => {
                    let ts = packet.header.ts;
                    let timestamp = DateTime::from_timestamp(
                        i64::from(ts.tv_sec),
                        u32::try_from(ts.tv_usec).unwrap_or(0).saturating_mul(1_000),
                    )
                    .unwrap_or_else(Utc::now);
                    Ok(Some(RawFrame {
                        data: Bytes::copy_from_slice(packet.data),
                        timestamp,
                        original_len: packet.header.len as usize,
                    }))
                }
                Err(pcap::Error::TimeoutExpired) => Ok(None),
                Err(pcap::Error::NoMorePackets) => Err(CaptureError::Closed),
                Err(e) => Err(CaptureError::Read(e.to_string())),
            }
        }
    }
}
