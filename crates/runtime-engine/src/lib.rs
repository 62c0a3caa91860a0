//! # runsight-engine
//!
//! 커널 이벤트 수집부터 알림 생성까지의 런타임 탐지 파이프라인.
//!
//! # 모듈 구성
//! - [`config`]: core 설정에서 엔진 설정 추출
//! - [`decoder`]: 320바이트 고정 레이아웃 레코드 디코딩
//! - [`identity`]: procfs 기반 컨테이너/파드 식별 (IdentityResolver 구현)
//! - [`detector`]: 리버스 셸 / 인젝션 / 의심 실행 탐지 (Detector trait 구현)
//! - [`source`]: 원시 레코드 소스 추상화 + aya perf 어댑터 (Linux)
//! - [`ingest`]: 수집 루프 (Decoder → Resolver → Engine → 수집 큐)
//!
//! # 공유 타입
//! 커널/유저스페이스 공유 레이아웃은 [`runsight_ebpf_common`] 크레이트에 정의되어 있습니다.

pub mod config;
pub mod decoder;
pub mod detector;
pub mod identity;
pub mod ingest;
pub mod source;

// --- 주요 타입 re-export ---

// 설정
pub use config::EngineConfig;

// 디코딩
pub use decoder::decode;

// 식별
pub use identity::ProcfsResolver;

// 탐지
pub use detector::{DetectionEngine, ProcessInjectionRule, ReverseShellRule, SuspiciousExecRule};

// 수집
pub use ingest::{IngestStats, IngestionLoop, IngestionLoopBuilder};
pub use source::{EventSource, PerfEventSource, RawRecord, SourceError};

// 공유 타입 (커널/유저스페이스 공통)
pub use runsight_ebpf_common;
