//! 알림 스트림 에러 타입
//!
//! [`StreamError`]는 버스/게이트웨이 내부 에러를 표현합니다.
//! `From<StreamError> for RunsightError` 변환으로 데몬에서 `?`로 전파할 수 있습니다.

use runsight_core::error::{ConfigError, PipelineError, RunsightError};

/// 알림 스트림 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// 수신 소켓 바인드 실패
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// 바인드하려던 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 값 오류
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 잘못된 HTTP 요청
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 알림 직렬화 실패
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StreamError> for RunsightError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Config { field, reason } => {
                RunsightError::Config(ConfigError::InvalidValue { field, reason })
            }
            StreamError::Io(e) => RunsightError::Io(e),
            other => RunsightError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_display() {
        let err = StreamError::Bind {
            addr: "0.0.0.0:8090".to_owned(),
            reason: "address in use".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.0.0.0:8090"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn config_error_converts_to_config() {
        let err = StreamError::Config {
            field: "stream.listen_addr".to_owned(),
            reason: "invalid".to_owned(),
        };
        let top: RunsightError = err.into();
        assert!(matches!(
            top,
            RunsightError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bind_error_converts_to_pipeline() {
        let err = StreamError::Bind {
            addr: ":8090".to_owned(),
            reason: "denied".to_owned(),
        };
        let top: RunsightError = err.into();
        assert!(matches!(top, RunsightError::Pipeline(_)));
    }
}
