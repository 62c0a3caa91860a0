//! 파이프라인 trait: 모듈 확장 포인트 정의

use crate::event::RuntimeEvent;
use crate::types::{Alert, ContainerIdentity, PodIdentity};

/// 탐지 로직을 구현하는 trait
///
/// 새로운 탐지 규칙을 추가하려면 이 trait을 구현합니다.
/// 구현체는 상태를 갖지 않아야 하며, 같은 입력에 대해 항상 같은 결과를 반환해야 합니다.
pub trait Detector: Send + Sync {
    /// 탐지 규칙 ID
    fn name(&self) -> &str;

    /// 이벤트를 분석하여 알림 생성 여부를 결정
    fn detect(&self, event: &RuntimeEvent) -> Option<Alert>;
}

/// 워크로드 식별 정보 조회 trait
///
/// 조회 실패는 에러가 아니라 센티널 값으로 표현됩니다.
pub trait IdentityResolver: Send + Sync {
    /// 프로세스의 컨테이너 식별 정보를 조회합니다.
    ///
    /// `cgroup_id`는 진단 로그용으로만 전달됩니다.
    fn resolve_container(&self, pid: u32, cgroup_id: u64) -> ContainerIdentity;

    /// 에이전트가 실행 중인 파드 식별 정보를 반환합니다.
    fn resolve_pod(&self) -> PodIdentity;
}
