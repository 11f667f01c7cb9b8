//! 설정 관리: lanshield.toml 파싱 및 런타임 설정
//!
//! [`LanshieldConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LANSHIELD_CAPTURE_INTERFACE=eth0` 형식)
//! 3. 설정 파일 (`lanshield.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), lanshield_core::error::LanshieldError> {
//! use lanshield_core::config::LanshieldConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LanshieldConfig::load("lanshield.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LanshieldConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LanshieldError};
use crate::types::AlertType;

/// LanShield 통합 설정
///
/// `lanshield.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanshieldConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 패킷 캡처 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 이상 탐지기 설정
    #[serde(default)]
    pub detection: DetectionConfig,
    /// 대역폭 집계기 설정
    #[serde(default)]
    pub bandwidth: BandwidthConfig,
    /// 트래픽 텔레메트리 설정
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// 알림 디스패처 설정
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LanshieldConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LanshieldError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LanshieldError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LanshieldError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LanshieldError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LanshieldError> {
        toml::from_str(toml_str).map_err(|e| {
            LanshieldError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LANSHIELD_{SECTION}_{FIELD}`
    /// 예: `LANSHIELD_CAPTURE_INTERFACE=eth0`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LANSHIELD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LANSHIELD_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "LANSHIELD_GENERAL_PID_FILE");

        // Capture
        override_bool(&mut self.capture.enabled, "LANSHIELD_CAPTURE_ENABLED");
        override_string(&mut self.capture.interface, "LANSHIELD_CAPTURE_INTERFACE");
        override_bool(
            &mut self.capture.promiscuous,
            "LANSHIELD_CAPTURE_PROMISCUOUS",
        );
        override_u32(&mut self.capture.snaplen, "LANSHIELD_CAPTURE_SNAPLEN");
        override_u32(
            &mut self.capture.read_timeout_ms,
            "LANSHIELD_CAPTURE_READ_TIMEOUT_MS",
        );
        override_usize(
            &mut self.capture.channel_capacity,
            "LANSHIELD_CAPTURE_CHANNEL_CAPACITY",
        );

        // Detection
        override_usize(
            &mut self.detection.port_scan_threshold,
            "LANSHIELD_DETECTION_PORT_SCAN_THRESHOLD",
        );
        override_u64(
            &mut self.detection.port_scan_window_secs,
            "LANSHIELD_DETECTION_PORT_SCAN_WINDOW_SECS",
        );
        override_u64(
            &mut self.detection.port_scan_settle_secs,
            "LANSHIELD_DETECTION_PORT_SCAN_SETTLE_SECS",
        );
        override_ports(
            &mut self.detection.suspicious_ports,
            "LANSHIELD_DETECTION_SUSPICIOUS_PORTS",
        );
        override_u64(
            &mut self.detection.traffic_bytes_per_sec_threshold,
            "LANSHIELD_DETECTION_TRAFFIC_BYTES_PER_SEC_THRESHOLD",
        );
        override_u64(
            &mut self.detection.traffic_packets_per_sec_threshold,
            "LANSHIELD_DETECTION_TRAFFIC_PACKETS_PER_SEC_THRESHOLD",
        );
        override_usize(
            &mut self.detection.max_arp_entries,
            "LANSHIELD_DETECTION_MAX_ARP_ENTRIES",
        );

        // Bandwidth
        override_bool(&mut self.bandwidth.enabled, "LANSHIELD_BANDWIDTH_ENABLED");
        override_u64(
            &mut self.bandwidth.threshold_bytes_per_sec,
            "LANSHIELD_BANDWIDTH_THRESHOLD_BYTES_PER_SEC",
        );
        override_u64(
            &mut self.bandwidth.daily_quota_bytes,
            "LANSHIELD_BANDWIDTH_DAILY_QUOTA_BYTES",
        );

        // Telemetry
        override_usize(
            &mut self.telemetry.suspicious_capacity,
            "LANSHIELD_TELEMETRY_SUSPICIOUS_CAPACITY",
        );
        override_bool(
            &mut self.telemetry.report_suspicious,
            "LANSHIELD_TELEMETRY_REPORT_SUSPICIOUS",
        );

        // Dispatcher
        override_usize(
            &mut self.dispatcher.recent_capacity,
            "LANSHIELD_DISPATCHER_RECENT_CAPACITY",
        );
        override_u64(
            &mut self.dispatcher.sweep_interval_secs,
            "LANSHIELD_DISPATCHER_SWEEP_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LANSHIELD_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "LANSHIELD_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "LANSHIELD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LanshieldError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.capture.enabled {
            if self.capture.interface.is_empty() {
                return Err(invalid(
                    "capture.interface",
                    "interface must not be empty when capture is enabled",
                ));
            }
            if self.capture.channel_capacity == 0 {
                return Err(invalid("capture.channel_capacity", "must be greater than 0"));
            }
        }

        let d = &self.detection;
        require_nonzero("detection.port_scan_threshold", d.port_scan_threshold as u64)?;
        require_nonzero("detection.port_scan_window_secs", d.port_scan_window_secs)?;
        require_nonzero("detection.port_scan_settle_secs", d.port_scan_settle_secs)?;
        require_nonzero(
            "detection.suspicious_port_cooldown_secs",
            d.suspicious_port_cooldown_secs,
        )?;
        require_nonzero("detection.traffic_window_secs", d.traffic_window_secs)?;
        require_nonzero(
            "detection.traffic_bytes_per_sec_threshold",
            d.traffic_bytes_per_sec_threshold,
        )?;
        require_nonzero(
            "detection.traffic_packets_per_sec_threshold",
            d.traffic_packets_per_sec_threshold,
        )?;
        require_nonzero("detection.max_arp_entries", d.max_arp_entries as u64)?;

        if self.bandwidth.enabled {
            require_nonzero(
                "bandwidth.evaluation_interval_secs",
                self.bandwidth.evaluation_interval_secs,
            )?;
            require_nonzero(
                "bandwidth.cleanup_interval_secs",
                self.bandwidth.cleanup_interval_secs,
            )?;
            if self.bandwidth.quota_warning_percent == 0 || self.bandwidth.quota_warning_percent > 100
            {
                return Err(invalid(
                    "bandwidth.quota_warning_percent",
                    "must be between 1 and 100",
                ));
            }
        }

        let t = &self.telemetry;
        require_nonzero("telemetry.tick_interval_secs", t.tick_interval_secs)?;
        require_nonzero("telemetry.cleanup_interval_secs", t.cleanup_interval_secs)?;
        require_nonzero("telemetry.suspicious_capacity", t.suspicious_capacity as u64)?;
        require_nonzero(
            "telemetry.port_fanout_threshold",
            t.port_fanout_threshold as u64,
        )?;

        require_nonzero(
            "dispatcher.recent_capacity",
            self.dispatcher.recent_capacity as u64,
        )?;
        require_nonzero(
            "dispatcher.sweep_interval_secs",
            self.dispatcher.sweep_interval_secs,
        )?;
        require_nonzero(
            "dispatcher.persist_channel_capacity",
            self.dispatcher.persist_channel_capacity as u64,
        )?;

        if self.metrics.enabled {
            if self.metrics.endpoint != "/metrics" {
                return Err(invalid(
                    "metrics.endpoint",
                    "only '/metrics' is currently supported",
                ));
            }
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LanshieldError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn require_nonzero(field: &str, value: u64) -> Result<(), LanshieldError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than 0"));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: "/var/run/lanshield.pid".to_owned(),
        }
    }
}

/// 패킷 캡처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 캡처할 네트워크 인터페이스
    pub interface: String,
    /// 무차별 모드
    pub promiscuous: bool,
    /// 프레임당 최대 캡처 길이 (바이트)
    pub snaplen: u32,
    /// 읽기 타임아웃 (밀리초). 타임아웃은 에러가 아님
    pub read_timeout_ms: u32,
    /// 캡처 루프 → 처리기 채널 용량
    pub channel_capacity: usize,
    /// 이벤트에 원시 프레임을 보관할지 여부
    pub keep_raw: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interface: "eth0".to_owned(),
            promiscuous: true,
            snaplen: 65_535,
            read_timeout_ms: 1_000,
            channel_capacity: 4_096,
            keep_raw: false,
        }
    }
}

/// 이상 탐지기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 포트 스캔 판정 임계값 (윈도우 내 고유 목적지 포트 수)
    pub port_scan_threshold: usize,
    /// 포트 스캔 슬라이딩 윈도우 (초)
    pub port_scan_window_secs: u64,
    /// 스캔이 이 시간 동안 잠잠하면 알림을 확정합니다 (초)
    pub port_scan_settle_secs: u64,
    /// 의심 포트 목록
    pub suspicious_ports: Vec<u16>,
    /// (출발지, 포트)별 의심 포트 재알림 간격 (초)
    pub suspicious_port_cooldown_secs: u64,
    /// 트래픽 볼륨 집계 윈도우 (초)
    pub traffic_window_secs: u64,
    /// 트래픽 볼륨 바이트 임계값 (B/s)
    pub traffic_bytes_per_sec_threshold: u64,
    /// 트래픽 볼륨 패킷 임계값 (pps)
    pub traffic_packets_per_sec_threshold: u64,
    /// 같은 키에 대한 트래픽 볼륨 알림 최소 간격 (초)
    pub traffic_alert_interval_secs: u64,
    /// ARP 테이블 최대 엔트리 수
    pub max_arp_entries: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            port_scan_threshold: 20,
            port_scan_window_secs: 60,
            port_scan_settle_secs: 5,
            suspicious_ports: vec![
                23, 135, 139, 445, 1433, 3306, 3389, 4444, 5900, 6667, 31337,
            ],
            suspicious_port_cooldown_secs: 300,
            traffic_window_secs: 10,
            traffic_bytes_per_sec_threshold: 10 * 1024 * 1024,
            traffic_packets_per_sec_threshold: 1_000,
            traffic_alert_interval_secs: 60,
            max_arp_entries: 10_000,
        }
    }
}

/// 대역폭 집계기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthConfig {
    /// 임계값/쿼터 평가 활성화 여부
    pub enabled: bool,
    /// 장치별 대역폭 임계값 (B/s)
    pub threshold_bytes_per_sec: u64,
    /// 장치별 일일 쿼터 (바이트, 0이면 쿼터 없음)
    pub daily_quota_bytes: u64,
    /// 쿼터 경고 비율 (%)
    pub quota_warning_percent: u8,
    /// 평가 대상으로 삼을 최근 활동 범위 (초)
    pub active_window_secs: u64,
    /// (장치, 제목)별 알림 쿨다운 (초)
    pub alert_cooldown_secs: u64,
    /// 평가 주기 (초)
    pub evaluation_interval_secs: u64,
    /// 정리 주기 (초)
    pub cleanup_interval_secs: u64,
    /// 비활성 장치 트래커 보존 기간 (일)
    pub inactive_device_days: u64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes_per_sec: 12_500_000, // 100 Mbit/s
            daily_quota_bytes: 0,
            quota_warning_percent: 90,
            active_window_secs: 300,
            alert_cooldown_secs: 1_800,
            evaluation_interval_secs: 60,
            cleanup_interval_secs: 3_600,
            inactive_device_days: 7,
        }
    }
}

/// 트래픽 텔레메트리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 실시간 속도 재계산 주기 (초)
    pub tick_interval_secs: u64,
    /// 정리 주기 (초)
    pub cleanup_interval_secs: u64,
    /// 연결 유휴 만료 (초)
    pub connection_idle_secs: u64,
    /// top-talker 유휴 만료 (초)
    pub talker_idle_secs: u64,
    /// 시간별 버킷 보존 기간 (일)
    pub hourly_retention_days: u64,
    /// 의심 활동 링 버퍼 용량
    pub suspicious_capacity: usize,
    /// 한 출발지의 1분 내 고유 목적지 포트 수가 이 값을 넘으면 의심
    pub port_fanout_threshold: usize,
    /// 의심 활동을 디스패처 알림으로도 제출할지 여부
    pub report_suspicious: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            cleanup_interval_secs: 60,
            connection_idle_secs: 300,
            talker_idle_secs: 3_600,
            hourly_retention_days: 7,
            suspicious_capacity: 1_000,
            port_fanout_threshold: 10,
            report_suspicious: true,
        }
    }
}

/// 알림 디스패처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 최근 알림 링 버퍼 용량
    pub recent_capacity: usize,
    /// 쿨다운 스윕 주기 (초)
    pub sweep_interval_secs: u64,
    /// 영속화 채널 용량
    pub persist_channel_capacity: usize,
    /// 알림 타입별 쿨다운 (초)
    #[serde(default)]
    pub cooldowns: CooldownConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 100,
            sweep_interval_secs: 300,
            persist_channel_capacity: 1_024,
            cooldowns: CooldownConfig::default(),
        }
    }
}

/// 알림 타입별 쿨다운 간격 (초)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub new_device: u64,
    pub arp_spoofing: u64,
    pub malware_critical: u64,
    pub port_scan: u64,
    pub suspicious_port: u64,
    pub traffic_volume: u64,
    pub malformed_packet: u64,
    pub bandwidth_threshold: u64,
    pub quota_warning: u64,
    pub quota_exceeded: u64,
    pub suspicious_traffic: u64,
}

impl CooldownConfig {
    /// 알림 타입의 쿨다운 간격
    pub fn interval(&self, alert_type: AlertType) -> Duration {
        let secs = match alert_type {
            AlertType::NewDevice => self.new_device,
            AlertType::ArpSpoofing => self.arp_spoofing,
            AlertType::MalwareCritical => self.malware_critical,
            AlertType::PortScan => self.port_scan,
            AlertType::SuspiciousPort => self.suspicious_port,
            AlertType::TrafficVolume => self.traffic_volume,
            AlertType::MalformedPacket => self.malformed_packet,
            AlertType::BandwidthThreshold => self.bandwidth_threshold,
            AlertType::QuotaWarning => self.quota_warning,
            AlertType::QuotaExceeded => self.quota_exceeded,
            AlertType::SuspiciousTraffic => self.suspicious_traffic,
        };
        Duration::from_secs(secs)
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            new_device: 24 * 3_600,
            arp_spoofing: 60,
            malware_critical: 60,
            port_scan: 15 * 60,
            suspicious_port: 10 * 60,
            traffic_volume: 5 * 60,
            malformed_packet: 30 * 60,
            bandwidth_threshold: 30 * 60,
            quota_warning: 60 * 60,
            quota_exceeded: 60 * 60,
            suspicious_traffic: 5 * 60,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9_100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse {} from env var, ignoring",
                type_name
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

/// 쉼표 구분 포트 목록. 하나라도 파싱에 실패하면 전체를 무시합니다.
fn override_ports(target: &mut Vec<u16>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        let parsed: Result<Vec<u16>, _> = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<u16>)
            .collect();
        match parsed {
            Ok(ports) => *target = ports,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse port list from env var, ignoring"
            ),
        }
    }
}
