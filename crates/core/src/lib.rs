//! # runsight-core
//!
//! Runsight 런타임 보안 에이전트의 공통 타입, trait, 에러, 설정.
//!
//! 모든 크레이트는 이 크레이트에만 의존하며, 서로를 직접 참조하지 않습니다
//! (데몬 제외).
//!
//! - [`event`]: 커널 이벤트 레코드와 보강된 런타임 이벤트
//! - [`types`]: 컨테이너/파드 식별 정보, 심각도, 알림
//! - [`pipeline`]: 탐지 규칙과 식별 리졸버 trait
//! - [`config`]: `runsight.toml` + 환경변수 설정
//! - [`metrics`]: Prometheus 메트릭 이름

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, DecodeError, DetectionError, PipelineError, RunsightError};

// 설정
pub use config::RunsightConfig;

// 이벤트
pub use event::{Event, FixedStr, RuntimeEvent};

// 파이프라인 trait
pub use pipeline::{Detector, IdentityResolver};

// 도메인 타입
pub use types::{Alert, ContainerIdentity, PodIdentity, Severity};
