//! # runsight-alert-stream
//!
//! 탐지 알림을 구독자에게 실시간으로 전달하는 팬아웃 버스와 SSE 게이트웨이.
//!
//! # 모듈 구성
//!
//! - [`bus`]: 구독자 레지스트리, non-blocking 브로드캐스트, 수집 큐 브로드캐스터
//! - [`gateway`]: `/healthz`, `/events` HTTP 엔드포인트
//! - [`config`]: core `[stream]` 설정에서 게이트웨이 설정 추출
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! IngestionLoop -> ingest queue -> run_broadcaster -> AlertBus -> SubscriberHandle -> SSE client
//!                  (bounded)                          (mutex)     (bounded, per client)
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;

// --- 주요 타입 re-export ---

// 버스
pub use bus::{AlertBus, SubscriberHandle, run_broadcaster};

// 게이트웨이
pub use gateway::StreamingGateway;

// 설정
pub use config::GatewayConfig;

// 에러
pub use error::StreamError;
