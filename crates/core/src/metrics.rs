//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않았으면 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `lanshield_`
//! - 모듈명: `capture_`, `detector_`, `telemetry_`, `bandwidth_`, `dispatcher_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(lanshield_core::metrics::CAPTURE_FRAMES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 탐지기 레이블 키 (port_scan, arp_spoof, ...)
pub const LABEL_DETECTOR: &str = "detector";

/// 알림 타입 레이블 키
pub const LABEL_ALERT_TYPE: &str = "alert_type";

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

// ─── Capture 메트릭 ────────────────────────────────────────────────

/// Capture: 캡처된 전체 프레임 수 (counter)
pub const CAPTURE_FRAMES_TOTAL: &str = "lanshield_capture_frames_total";

/// Capture: 디코딩 실패로 버려진 프레임 수 (counter)
pub const CAPTURE_FRAMES_DROPPED_TOTAL: &str = "lanshield_capture_frames_dropped_total";

// ─── Detector 메트릭 ───────────────────────────────────────────────

/// Detector: 처리된 패킷 수 (counter)
pub const DETECTOR_PACKETS_PROCESSED_TOTAL: &str = "lanshield_detector_packets_processed_total";

/// Detector: 탐지기 실패 수 (counter, label: detector)
pub const DETECTOR_FAILURES_TOTAL: &str = "lanshield_detector_failures_total";

/// Detector: 탐지기별 생성 알림 수 (counter, label: detector)
pub const DETECTOR_ALERTS_TOTAL: &str = "lanshield_detector_alerts_total";

// ─── Telemetry 메트릭 ──────────────────────────────────────────────

/// Telemetry: 초당 패킷 수 (gauge)
pub const TELEMETRY_PACKETS_PER_SECOND: &str = "lanshield_telemetry_packets_per_second";

/// Telemetry: 초당 바이트 수 (gauge)
pub const TELEMETRY_BYTES_PER_SECOND: &str = "lanshield_telemetry_bytes_per_second";

/// Telemetry: 네트워크 건강 점수 0~100 (gauge)
pub const TELEMETRY_HEALTH_SCORE: &str = "lanshield_telemetry_health_score";

/// Telemetry: 활성 연결 수 (gauge)
pub const TELEMETRY_ACTIVE_CONNECTIONS: &str = "lanshield_telemetry_active_connections";

// ─── Bandwidth 메트릭 ──────────────────────────────────────────────

/// Bandwidth: 추적 중인 장치 수 (gauge)
pub const BANDWIDTH_TRACKED_DEVICES: &str = "lanshield_bandwidth_tracked_devices";

// ─── Dispatcher 메트릭 ─────────────────────────────────────────────

/// Dispatcher: 수락된 알림 수 (counter, label: alert_type)
pub const DISPATCHER_ALERTS_SENT_TOTAL: &str = "lanshield_dispatcher_alerts_sent_total";

/// Dispatcher: 쿨다운으로 억제된 알림 수 (counter, label: alert_type)
pub const DISPATCHER_ALERTS_SUPPRESSED_TOTAL: &str =
    "lanshield_dispatcher_alerts_suppressed_total";

/// Dispatcher: 활성 쿨다운 엔트리 수 (gauge)
pub const DISPATCHER_ACTIVE_COOLDOWNS: &str = "lanshield_dispatcher_active_cooldowns";

/// Dispatcher: 영속화 실패 수 (counter)
pub const DISPATCHER_PERSIST_FAILURES_TOTAL: &str = "lanshield_dispatcher_persist_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "lanshield_daemon_uptime_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다. 일반적으로 `lanshield-daemon`의
/// 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Capture
    describe_counter!(
        CAPTURE_FRAMES_TOTAL,
        "Total number of link-layer frames read from the capture device"
    );
    describe_counter!(
        CAPTURE_FRAMES_DROPPED_TOTAL,
        "Total number of frames dropped because they could not be decoded"
    );

    // Detector
    describe_counter!(
        DETECTOR_PACKETS_PROCESSED_TOTAL,
        "Total number of packet events fanned out to the detectors"
    );
    describe_counter!(
        DETECTOR_FAILURES_TOTAL,
        "Detector errors or panics caught per detector"
    );
    describe_counter!(DETECTOR_ALERTS_TOTAL, "Alerts produced per detector");

    // Telemetry
    describe_gauge!(
        TELEMETRY_PACKETS_PER_SECOND,
        "Live packet rate recomputed each telemetry tick"
    );
    describe_gauge!(
        TELEMETRY_BYTES_PER_SECOND,
        "Live byte rate recomputed each telemetry tick"
    );
    describe_gauge!(TELEMETRY_HEALTH_SCORE, "Network health score (0-100)");
    describe_gauge!(
        TELEMETRY_ACTIVE_CONNECTIONS,
        "Number of flows currently held in the connection table"
    );

    // Bandwidth
    describe_gauge!(
        BANDWIDTH_TRACKED_DEVICES,
        "Number of devices with a bandwidth tracker"
    );

    // Dispatcher
    describe_counter!(
        DISPATCHER_ALERTS_SENT_TOTAL,
        "Alerts accepted by the dispatcher and fanned out"
    );
    describe_counter!(
        DISPATCHER_ALERTS_SUPPRESSED_TOTAL,
        "Alerts suppressed by the per-key cooldown"
    );
    describe_gauge!(
        DISPATCHER_ACTIVE_COOLDOWNS,
        "Number of live dedup cooldown entries"
    );
    describe_counter!(
        DISPATCHER_PERSIST_FAILURES_TOTAL,
        "Accepted alerts that could not be handed to the alert store"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "LanShield daemon uptime in seconds");
}
