//! 에러 타입: 도메인별 에러 정의

/// LanShield 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LanshieldError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 캡처 장치 에러
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// 탐지기 에러
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    /// 외부 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 캡처 장치 에러
///
/// 장치 열기 실패는 수집 서브시스템에만 치명적이며 프로세스는 계속 동작합니다.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// 장치를 열 수 없음
    #[error("failed to open capture device '{device}': {reason}")]
    Open { device: String, reason: String },

    /// 프레임 읽기 실패
    #[error("capture read failed: {0}")]
    Read(String),

    /// 장치가 닫힘
    #[error("capture device closed")]
    Closed,
}

/// 탐지기 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// 탐지기 내부 처리 실패
    #[error("detector '{detector}' failed: {reason}")]
    Failed { detector: String, reason: String },

    /// 탐지기 상태 잠금 획득 실패
    #[error("detector state unavailable: {0}")]
    StateUnavailable(String),
}

/// 외부 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),
}
