//! 런타임 엔진 설정: core 설정에서 엔진이 사용하는 섹션만 추출
//!
//! [`EngineConfig`]는 core의 [`EbpfConfig`]와 [`PodConfig`]를 묶어
//! 이벤트 소스, 식별 리졸버, 수집 루프에 전달합니다.

use std::path::Path;

use runsight_core::config::{EbpfConfig, PodConfig, RunsightConfig};

/// 런타임 엔진 설정
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// 커널 이벤트 소스 설정 (프로브 경로, perf 버퍼 크기)
    pub ebpf: EbpfConfig,
    /// 파드 식별 정보 설정
    pub pod: PodConfig,
}

impl EngineConfig {
    /// core 설정에서 엔진 설정을 생성합니다.
    pub fn from_core(config: &RunsightConfig) -> Self {
        Self {
            ebpf: config.ebpf.clone(),
            pod: config.pod.clone(),
        }
    }

    /// 커널 프로브 오브젝트 경로
    pub fn object_path(&self) -> &Path {
        Path::new(&self.ebpf.object_path)
    }
}
