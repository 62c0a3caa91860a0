//! 게이트웨이 설정: core `[stream]` 섹션에서 추출

use std::net::SocketAddr;
use std::time::Duration;

use runsight_core::config::{RunsightConfig, StreamConfig};

use crate::error::StreamError;

/// 버스/게이트웨이 런타임 설정
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HTTP 수신 주소
    pub listen_addr: SocketAddr,
    /// 구독자별 전달 큐 용량
    pub subscriber_capacity: usize,
    /// 수집 루프 → 브로드캐스터 큐 용량
    pub ingest_capacity: usize,
    /// 동시 연결 최대 수
    pub max_connections: usize,
    /// 요청 헤더 수신 제한 시간
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// core 설정에서 게이트웨이 설정을 만듭니다.
    pub fn from_core(config: &RunsightConfig) -> Result<Self, StreamError> {
        Self::from_stream(&config.stream)
    }

    /// `[stream]` 섹션에서 게이트웨이 설정을 만듭니다.
    pub fn from_stream(stream: &StreamConfig) -> Result<Self, StreamError> {
        let listen_addr = stream.socket_addr().map_err(|reason| StreamError::Config {
            field: "stream.listen_addr".to_owned(),
            reason,
        })?;

        Ok(Self {
            listen_addr,
            subscriber_capacity: stream.subscriber_capacity,
            ingest_capacity: stream.ingest_capacity,
            max_connections: stream.max_connections,
            request_timeout: Duration::from_secs(stream.request_timeout_secs),
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let stream = StreamConfig::default();
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            subscriber_capacity: stream.subscriber_capacity,
            ingest_capacity: stream.ingest_capacity,
            max_connections: stream.max_connections,
            request_timeout: Duration::from_secs(stream.request_timeout_secs),
        }
    }
}
