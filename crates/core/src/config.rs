//! 설정 관리: runsight.toml 파싱 및 런타임 설정
//!
//! [`RunsightConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, 데몬에서 적용)
//! 2. 환경변수 (`LISTEN_ADDR=:8090`, `RUNSIGHT_STREAM_SUBSCRIBER_CAPACITY=64` 형식)
//! 3. 설정 파일 (`runsight.toml`, 선택)
//! 4. 기본값 (`Default` 구현)
//!
//! 빈 문자열 환경변수는 설정되지 않은 것으로 취급합니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), runsight_core::error::RunsightError> {
//! use runsight_core::config::RunsightConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = RunsightConfig::load("runsight.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = RunsightConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, RunsightError};

/// 기본 커널 프로브 오브젝트 경로
pub const DEFAULT_BPF_OBJECT: &str = "../ebpf/process_monitor.bpf.o";
/// 기본 스트리밍 수신 주소
pub const DEFAULT_LISTEN_ADDR: &str = ":8090";
/// 구독자별 전달 큐 기본 용량
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 32;
/// 수집 큐 기본 용량
pub const DEFAULT_INGEST_CAPACITY: usize = 1024;

/// Runsight 통합 설정
///
/// `runsight.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunsightConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 커널 이벤트 소스 설정
    #[serde(default)]
    pub ebpf: EbpfConfig,
    /// 알림 스트리밍 설정
    #[serde(default)]
    pub stream: StreamConfig,
    /// 파드 식별 정보 설정
    #[serde(default)]
    pub pod: PodConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl RunsightConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RunsightError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일 없이 기본값 + 환경변수로 설정을 구성합니다.
    pub fn from_env() -> Result<Self, RunsightError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RunsightError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunsightError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                RunsightError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, RunsightError> {
        toml::from_str(toml_str).map_err(|e| {
            RunsightError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 배포 매니페스트가 주입하는 짧은 이름(`BPF_OBJECT`, `LISTEN_ADDR`,
    /// `POD_NAMESPACE`, `POD_NAME`, `NODE_NAME`)을 먼저 적용하고,
    /// 이어서 `RUNSIGHT_{SECTION}_{FIELD}` 형식을 적용합니다.
    pub fn apply_env_overrides(&mut self) {
        // 배포 환경 변수
        override_string(&mut self.ebpf.object_path, "BPF_OBJECT");
        override_string(&mut self.stream.listen_addr, "LISTEN_ADDR");
        override_string(&mut self.pod.namespace, "POD_NAMESPACE");
        override_string(&mut self.pod.name, "POD_NAME");
        override_string(&mut self.pod.node, "NODE_NAME");

        // General
        override_string(&mut self.general.log_level, "RUNSIGHT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "RUNSIGHT_GENERAL_LOG_FORMAT");

        // eBPF
        override_string(&mut self.ebpf.object_path, "RUNSIGHT_EBPF_OBJECT_PATH");
        override_usize(
            &mut self.ebpf.perf_buffer_pages,
            "RUNSIGHT_EBPF_PERF_BUFFER_PAGES",
        );
        override_usize(
            &mut self.ebpf.record_channel_capacity,
            "RUNSIGHT_EBPF_RECORD_CHANNEL_CAPACITY",
        );

        // Stream
        override_string(&mut self.stream.listen_addr, "RUNSIGHT_STREAM_LISTEN_ADDR");
        override_usize(
            &mut self.stream.subscriber_capacity,
            "RUNSIGHT_STREAM_SUBSCRIBER_CAPACITY",
        );
        override_usize(
            &mut self.stream.ingest_capacity,
            "RUNSIGHT_STREAM_INGEST_CAPACITY",
        );
        override_usize(
            &mut self.stream.max_connections,
            "RUNSIGHT_STREAM_MAX_CONNECTIONS",
        );
        override_u64(
            &mut self.stream.request_timeout_secs,
            "RUNSIGHT_STREAM_REQUEST_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "RUNSIGHT_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "RUNSIGHT_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "RUNSIGHT_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RunsightError> {
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

        if self.ebpf.object_path.is_empty() {
            return Err(invalid("ebpf.object_path", "must not be empty"));
        }
        if self.ebpf.perf_buffer_pages == 0 || !self.ebpf.perf_buffer_pages.is_power_of_two() {
            return Err(invalid(
                "ebpf.perf_buffer_pages",
                "must be a non-zero power of two",
            ));
        }

        // 큐 용량 검증
        for (field, value) in [
            ("ebpf.record_channel_capacity", self.ebpf.record_channel_capacity),
            ("stream.subscriber_capacity", self.stream.subscriber_capacity),
            ("stream.ingest_capacity", self.stream.ingest_capacity),
            ("stream.max_connections", self.stream.max_connections),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        if self.stream.request_timeout_secs == 0 {
            return Err(invalid(
                "stream.request_timeout_secs",
                "must be greater than zero",
            ));
        }

        if let Err(e) = self.stream.socket_addr() {
            return Err(invalid("stream.listen_addr", e));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must not be zero when enabled"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> RunsightError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 커널 이벤트 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EbpfConfig {
    /// 사전 빌드된 프로브 오브젝트 경로
    pub object_path: String,
    /// CPU별 perf 버퍼 페이지 수 (2의 거듭제곱)
    pub perf_buffer_pages: usize,
    /// CPU 리더와 수집 루프 사이의 레코드 채널 용량
    pub record_channel_capacity: usize,
}

impl Default for EbpfConfig {
    fn default() -> Self {
        Self {
            object_path: DEFAULT_BPF_OBJECT.to_owned(),
            perf_buffer_pages: 8,
            record_channel_capacity: 1024,
        }
    }
}

/// 알림 스트리밍 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// HTTP 수신 주소 (`:8090` 처럼 호스트를 생략하면 모든 인터페이스)
    pub listen_addr: String,
    /// 구독자별 전달 큐 용량
    pub subscriber_capacity: usize,
    /// 수집 루프 → 브로드캐스터 큐 용량
    pub ingest_capacity: usize,
    /// 동시 HTTP 연결 최대 수
    pub max_connections: usize,
    /// 요청 헤더 수신 제한 시간 (초)
    pub request_timeout_secs: u64,
}

impl StreamConfig {
    /// 수신 주소를 소켓 주소로 변환합니다.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        parse_listen_addr(&self.listen_addr)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            ingest_capacity: DEFAULT_INGEST_CAPACITY,
            max_connections: 256,
            request_timeout_secs: 10,
        }
    }
}

/// 파드 식별 정보 설정
///
/// `name`이 비어 있으면 호스트 이름을 사용합니다 (식별 리졸버에서 처리).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodConfig {
    /// 네임스페이스
    pub namespace: String,
    /// 파드 이름 (빈 값 = 호스트 이름)
    pub name: String,
    /// 노드 이름
    pub node: String,
}

impl Default for PodConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_owned(),
            name: String::new(),
            node: "node-unknown".to_owned(),
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
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 수신 주소 문자열을 파싱합니다.
///
/// 앞의 `:`만 있는 형식(`:8090`)은 모든 인터페이스(`0.0.0.0`)로 해석합니다.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, String> {
    let normalized = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_owned(),
    };
    normalized
        .parse()
        .map_err(|e| format!("invalid listen address '{addr}': {e}"))
}

// --- 환경변수 오버라이드 헬퍼 ---

/// 설정되어 있고 비어 있지 않은 환경변수 값
fn env_value(env_key: &str) -> Option<String> {
    std::env::var(env_key).ok().filter(|v| !v.is_empty())
}

fn override_string(target: &mut String, env_key: &str) {
    if let Some(val) = env_value(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Some(val) = env_value(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Some(val) = env_value(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Some(val) = env_value(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Some(val) = env_value(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = RunsightConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.ebpf.object_path, "../ebpf/process_monitor.bpf.o");
        assert_eq!(config.stream.listen_addr, ":8090");
        assert_eq!(config.stream.subscriber_capacity, 32);
        assert_eq!(config.stream.ingest_capacity, 1024);
        assert_eq!(config.pod.namespace, "default");
        assert!(config.pod.name.is_empty());
        assert_eq!(config.pod.node, "node-unknown");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = RunsightConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = RunsightConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.stream.listen_addr, ":8090");
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[stream]
listen_addr = "127.0.0.1:9000"
"#;
        let config = RunsightConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.stream.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.stream.subscriber_capacity, 32);
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"

[ebpf]
object_path = "/opt/runsight/process_monitor.bpf.o"
perf_buffer_pages = 16
record_channel_capacity = 4096

[stream]
listen_addr = ":9090"
subscriber_capacity = 64
ingest_capacity = 2048
max_connections = 32
request_timeout_secs = 5

[pod]
namespace = "security"
name = "runsight-abcde"
node = "worker-3"

[metrics]
enabled = true
listen_addr = "0.0.0.0"
port = 9200
endpoint = "/metrics"
"#;
        let config = RunsightConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.ebpf.perf_buffer_pages, 16);
        assert_eq!(config.stream.subscriber_capacity, 64);
        assert_eq!(config.pod.node, "worker-3");
        assert_eq!(config.metrics.port, 9200);
        config.validate().unwrap();
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = RunsightConfig::parse("invalid = [[[toml");
        assert!(matches!(
            result,
            Err(RunsightError::Config(ConfigError::ParseFailed { .. }))
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = RunsightConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = RunsightConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = RunsightConfig::default();
        config.stream.subscriber_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("subscriber_capacity"));
    }

    #[test]
    fn validate_rejects_non_power_of_two_pages() {
        let mut config = RunsightConfig::default();
        config.ebpf.perf_buffer_pages = 3;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("perf_buffer_pages"));
    }

    #[test]
    fn validate_rejects_unparseable_listen_addr() {
        let mut config = RunsightConfig::default();
        config.stream.listen_addr = "not-an-address".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn listen_addr_with_leading_colon_binds_all_interfaces() {
        let addr = parse_listen_addr(":8090").unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 8090);

        let addr = parse_listen_addr("127.0.0.1:7000").unwrap();
        assert!(addr.ip().is_loopback());
    }

    #[test]
    #[serial]
    fn env_override_deployment_variables() {
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe {
            std::env::set_var("BPF_OBJECT", "/opt/probe.o");
            std::env::set_var("LISTEN_ADDR", ":9999");
            std::env::set_var("POD_NAMESPACE", "kube-system");
            std::env::set_var("POD_NAME", "agent-xyz");
            std::env::set_var("NODE_NAME", "node-7");
        }
        let mut config = RunsightConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("BPF_OBJECT");
            std::env::remove_var("LISTEN_ADDR");
            std::env::remove_var("POD_NAMESPACE");
            std::env::remove_var("POD_NAME");
            std::env::remove_var("NODE_NAME");
        }

        assert_eq!(config.ebpf.object_path, "/opt/probe.o");
        assert_eq!(config.stream.listen_addr, ":9999");
        assert_eq!(config.pod.namespace, "kube-system");
        assert_eq!(config.pod.name, "agent-xyz");
        assert_eq!(config.pod.node, "node-7");
    }

    #[test]
    #[serial]
    fn env_override_empty_value_counts_as_unset() {
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("POD_NAMESPACE", "") };
        let mut config = RunsightConfig::default();
        config.apply_env_overrides();
        unsafe { std::env::remove_var("POD_NAMESPACE") };

        assert_eq!(config.pod.namespace, "default");
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_RUNSIGHT_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_RUNSIGHT_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_RUNSIGHT_BOOL_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_usize_valid() {
        let mut val = 32usize;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_RUNSIGHT_USIZE", "128") };
        override_usize(&mut val, "TEST_RUNSIGHT_USIZE");
        assert_eq!(val, 128);
        unsafe { std::env::remove_var("TEST_RUNSIGHT_USIZE") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_RUNSIGHT_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = RunsightConfig::from_file("/nonexistent/path/runsight.toml").await;
        assert!(matches!(
            result,
            Err(RunsightError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runsight.toml");
        std::fs::write(&path, "[pod]\nnamespace = \"edge\"\n").unwrap();

        let config = RunsightConfig::from_file(&path).await.unwrap();
        assert_eq!(config.pod.namespace, "edge");
    }
}
