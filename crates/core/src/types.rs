//! 도메인 타입: 워크로드 식별 정보와 보안 알림
//!
//! 컨테이너/파드 식별 정보는 조회 실패 시에도 에러가 아닌 센티널 값으로
//! 표현됩니다. 하위 모듈은 센티널을 정상적인 식별 값으로 취급해야 합니다.

use std::fmt;

use serde::Serialize;

use crate::event::RuntimeEvent;

// --- 컨테이너 센티널 상수 ---

/// cgroup 레코드를 열 수 없음 (호스트 프로세스 또는 이미 종료된 프로세스)
pub const CONTAINER_HOST: &str = "host";
/// cgroup 레코드는 읽었지만 컨테이너 ID 패턴이 없음
pub const CONTAINER_UNRESOLVED: &str = "cgid";
/// cgroup 레코드를 읽는 도중 실패
pub const CONTAINER_LOOKUP_ERROR: &str = "error";
/// cgroup 기반으로 식별된 런타임 레이블
pub const RUNTIME_CGROUP: &str = "cgroup";

/// 컨테이너 ID 축약 길이
pub const SHORT_ID_LEN: usize = 12;

/// 컨테이너 식별 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ContainerIdentity {
    /// 전체 컨테이너 ID 또는 센티널 값
    pub id: String,
    /// 축약 ID (앞 12자) 또는 센티널 값
    pub name: String,
    /// 런타임 레이블
    pub runtime: String,
}

impl ContainerIdentity {
    /// cgroup에서 찾은 컨테이너 ID로 식별 정보를 생성합니다.
    pub fn from_cgroup_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let name = id.chars().take(SHORT_ID_LEN).collect();
        Self {
            id,
            name,
            runtime: RUNTIME_CGROUP.to_owned(),
        }
    }

    /// `host` 센티널
    pub fn host() -> Self {
        Self {
            id: CONTAINER_HOST.to_owned(),
            name: String::new(),
            runtime: String::new(),
        }
    }

    /// `cgid` 센티널
    pub fn unresolved() -> Self {
        Self {
            id: CONTAINER_UNRESOLVED.to_owned(),
            name: CONTAINER_UNRESOLVED.to_owned(),
            runtime: RUNTIME_CGROUP.to_owned(),
        }
    }

    /// `error` 센티널
    pub fn lookup_failed() -> Self {
        Self {
            id: CONTAINER_LOOKUP_ERROR.to_owned(),
            name: CONTAINER_LOOKUP_ERROR.to_owned(),
            runtime: RUNTIME_CGROUP.to_owned(),
        }
    }

    /// 센티널 값인지 확인합니다.
    pub fn is_sentinel(&self) -> bool {
        matches!(
            self.id.as_str(),
            CONTAINER_HOST | CONTAINER_UNRESOLVED | CONTAINER_LOOKUP_ERROR
        )
    }
}

impl fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.name, self.runtime)
        }
    }
}

/// 파드 식별 정보
///
/// 각 필드는 독립적으로 기본값을 가집니다 (설정 계층 참조).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PodIdentity {
    /// 파드 이름
    pub name: String,
    /// 네임스페이스
    pub namespace: String,
    /// 노드 이름
    pub node: String,
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.name, self.node)
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적: 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 직렬화 형식과 동일한 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 보안 알림
///
/// 탐지 규칙이 발동했을 때 생성되며 생성 이후 변경되지 않습니다.
/// `event`는 알림 시점의 [`RuntimeEvent`] 복사본을 소유합니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// 탐지 규칙 ID (예: `reverse_shell`)
    pub rule_id: String,
    /// 심각도
    pub severity: Severity,
    /// 위험 점수 (0~100)
    pub risk_score: u8,
    /// 탐지 사유
    pub reason: String,
    /// 권장 대응
    pub recommendation: String,
    /// 알림을 유발한 이벤트 스냅샷
    pub event: RuntimeEvent,
}

impl Alert {
    /// 알림을 JSON 한 줄로 직렬화합니다.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} risk={} ({})",
            self.severity, self.rule_id, self.risk_score, self.reason,
        )
    }
}
