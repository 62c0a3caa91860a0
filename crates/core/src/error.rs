//! 에러 타입: 도메인별 에러 정의

/// Runsight 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum RunsightError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 탐지 엔진 / 커널 프로브 에러
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    /// 원시 이벤트 디코딩 에러
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

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
}

/// 탐지 엔진 / 커널 프로브 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// eBPF 오브젝트 로드 실패
    #[error("ebpf load failed: {0}")]
    EbpfLoad(String),

    /// eBPF 프로그램 어태치 실패
    #[error("ebpf attach failed: {program}: {reason}")]
    EbpfAttach { program: String, reason: String },

    /// eBPF 맵 / perf 리더 생성 실패
    #[error("ebpf map error: {0}")]
    EbpfMap(String),
}

/// 원시 이벤트 디코딩 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// 버퍼가 고정 레코드 크기보다 작음
    #[error("record too short: {len} bytes (expected at least {expected})")]
    TooShort { len: usize, expected: usize },
}
