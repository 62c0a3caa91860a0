//! 탐지 로직: 런타임 이벤트 기반 위협 탐지
//!
//! 리버스 셸, 프로세스 인젝션, 의심스러운 실행 경로를 탐지합니다.
//! 각 규칙은 [`Detector`] trait을 구현하며 [`DetectionEngine`]이 고정된 순서로
//! 독립적으로 평가합니다.
//!
//! # 탐지 전략
//! - **reverse_shell**: `connect` 이벤트 중 C2 포트 또는 셸 바이너리 + 비-root
//! - **process_injection**: `ptrace` / `mmap_exec` / `memfd` 이벤트
//! - **suspicious_exec**: `exec` 이벤트 중 `/tmp` 경로, memfd 경로, 비정상 부모
//!
//! # 아키텍처
//! ```text
//! RuntimeEvent ──▶ DetectionEngine ──▶ Vec<Alert>
//!                     │
//!                     ├── ReverseShellRule     (impl Detector)
//!                     ├── ProcessInjectionRule (impl Detector)
//!                     └── SuspiciousExecRule   (impl Detector)
//! ```
//!
//! 모든 규칙은 상태가 없으므로 엔진은 여러 태스크에서 공유해도 안전합니다.

use runsight_core::event::{
    EVENT_TYPE_CONNECT, EVENT_TYPE_EXEC, EVENT_TYPE_MEMFD, EVENT_TYPE_MMAP_EXEC,
    EVENT_TYPE_PTRACE, RuntimeEvent,
};
use runsight_core::pipeline::Detector;
use runsight_core::types::{Alert, Severity};

// =============================================================================
// 규칙 상수
// =============================================================================

/// 리버스 셸 규칙 ID
pub const RULE_REVERSE_SHELL: &str = "reverse_shell";
/// 프로세스 인젝션 규칙 ID
pub const RULE_PROCESS_INJECTION: &str = "process_injection";
/// 의심 실행 규칙 ID
pub const RULE_SUSPICIOUS_EXEC: &str = "suspicious_exec";
/// 셸 네트워크 활동 규칙 ID
pub const RULE_SHELL_NETWORK_ACTIVITY: &str = "shell_network_activity";

/// 알려진 C2 포트
const REVERSE_SHELL_PORTS: [u16; 3] = [4444, 8081, 9001];
/// 리버스 셸에 자주 쓰이는 바이너리
const REVERSE_SHELL_BINS: [&str; 4] = ["bash", "sh", "zsh", "python"];

const REASON_C2_PORT: &str = "reverse shell signature: known C2 port";
const REASON_SHELL_CONNECT: &str = "reverse shell signature: outbound connect from shell binary";
const RECOMMEND_REVERSE_SHELL: &str = "validate process tree, isolate pod, capture memory snapshot";

const REASON_INJECTION: &str = "injection primitive observed (ptrace/mmap_exec/memfd)";
const RECOMMEND_INJECTION: &str = "freeze process, capture core, verify container origin";

const REASON_TMP_EXEC: &str = "binary executed from /tmp";
const REASON_MEMFD_EXEC: &str = "anonymous memfd execution";
const REASON_UNUSUAL_PARENT: &str = "unexpected parent-child relationship";
const RECOMMEND_SUSPICIOUS_EXEC: &str = "trace process lineage and compare against allowed list";

const REASON_SHELL_NETWORK: &str = "shell binary initiated network connection";
const RECOMMEND_SHELL_NETWORK: &str = "verify if session is expected (kubectl exec vs unknown)";

fn is_shell_binary(event: &RuntimeEvent) -> bool {
    REVERSE_SHELL_BINS
        .iter()
        .any(|bin| event.event.comm.is(bin))
}

fn alert(
    rule_id: &str,
    severity: Severity,
    risk_score: u8,
    reason: &str,
    recommendation: &str,
    event: &RuntimeEvent,
) -> Alert {
    Alert {
        rule_id: rule_id.to_owned(),
        severity,
        risk_score,
        reason: reason.to_owned(),
        recommendation: recommendation.to_owned(),
        event: event.clone(),
    }
}

// =============================================================================
// 리버스 셸 탐지기
// =============================================================================

/// 리버스 셸 탐지기
///
/// `connect` 이벤트에서 C2 포트 접속 또는 셸 바이너리의 외부 접속을 탐지합니다.
/// root(uid 0) 프로세스는 제외합니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReverseShellRule;

impl Detector for ReverseShellRule {
    fn name(&self) -> &str {
        RULE_REVERSE_SHELL
    }

    fn detect(&self, event: &RuntimeEvent) -> Option<Alert> {
        let raw = &event.event;
        if !raw.is_type(EVENT_TYPE_CONNECT) {
            return None;
        }

        let port_flagged = REVERSE_SHELL_PORTS.contains(&raw.dst_port);
        let bin_flagged = is_shell_binary(event);
        let non_root = raw.uid != 0;

        if !((port_flagged || bin_flagged) && non_root) {
            return None;
        }

        let reason = if port_flagged {
            REASON_C2_PORT
        } else {
            REASON_SHELL_CONNECT
        };
        Some(alert(
            RULE_REVERSE_SHELL,
            Severity::High,
            85,
            reason,
            RECOMMEND_REVERSE_SHELL,
            event,
        ))
    }
}

// =============================================================================
// 프로세스 인젝션 탐지기
// =============================================================================

/// 프로세스 인젝션 탐지기
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessInjectionRule;

impl Detector for ProcessInjectionRule {
    fn name(&self) -> &str {
        RULE_PROCESS_INJECTION
    }

    fn detect(&self, event: &RuntimeEvent) -> Option<Alert> {
        let raw = &event.event;
        let injection = [EVENT_TYPE_PTRACE, EVENT_TYPE_MMAP_EXEC, EVENT_TYPE_MEMFD]
            .iter()
            .any(|kind| raw.is_type(kind));

        injection.then(|| {
            alert(
                RULE_PROCESS_INJECTION,
                Severity::High,
                90,
                REASON_INJECTION,
                RECOMMEND_INJECTION,
                event,
            )
        })
    }
}

// =============================================================================
// 의심 실행 탐지기
// =============================================================================

/// 의심 실행 탐지기
///
/// 사유 우선순위: `/tmp` 경로 > memfd 경로 > 비정상 부모(ppid 1, 비-root).
///
/// 셸 네트워크 활동(`shell_network_activity`) 검사는 `exec` 가드 뒤에서
/// `connect` 유형을 확인하므로 발동하지 않습니다. 규칙 집합의 동작을
/// 유지하기 위해 그대로 둡니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuspiciousExecRule;

impl Detector for SuspiciousExecRule {
    fn name(&self) -> &str {
        RULE_SUSPICIOUS_EXEC
    }

    fn detect(&self, event: &RuntimeEvent) -> Option<Alert> {
        let raw = &event.event;
        if !raw.is_type(EVENT_TYPE_EXEC) {
            return None;
        }

        let filename = raw.filename.to_string_lossy();
        let path = filename.trim();

        let in_tmp = path.starts_with("/tmp");
        let memfd = path.contains("memfd");
        let unusual_parent = raw.ppid == 1 && raw.uid != 0;

        let reason = if in_tmp {
            Some(REASON_TMP_EXEC)
        } else if memfd {
            Some(REASON_MEMFD_EXEC)
        } else if unusual_parent {
            Some(REASON_UNUSUAL_PARENT)
        } else {
            None
        };

        if let Some(reason) = reason {
            return Some(alert(
                RULE_SUSPICIOUS_EXEC,
                Severity::Medium,
                60,
                reason,
                RECOMMEND_SUSPICIOUS_EXEC,
                event,
            ));
        }

        if raw.is_type(EVENT_TYPE_CONNECT) && is_shell_binary(event) && raw.dst_port != 0 {
            return Some(alert(
                RULE_SHELL_NETWORK_ACTIVITY,
                Severity::Medium,
                55,
                REASON_SHELL_NETWORK,
                RECOMMEND_SHELL_NETWORK,
                event,
            ));
        }

        None
    }
}

// =============================================================================
// 탐지 엔진
// =============================================================================

/// 규칙 기반 탐지 엔진
///
/// 등록된 규칙을 등록 순서대로 평가하며, 각 규칙은 최대 하나의 알림을 생성합니다.
pub struct DetectionEngine {
    rules: Vec<Box<dyn Detector>>,
}

impl DetectionEngine {
    /// 규칙이 없는 엔진을 생성합니다.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// 기본 규칙 집합(reverse_shell → process_injection → suspicious_exec)으로 생성합니다.
    pub fn with_default_rules() -> Self {
        let mut engine = Self::new();
        engine.add_rule(Box::new(ReverseShellRule));
        engine.add_rule(Box::new(ProcessInjectionRule));
        engine.add_rule(Box::new(SuspiciousExecRule));
        engine
    }

    /// 규칙을 추가합니다 (평가 순서는 추가 순서).
    pub fn add_rule(&mut self, rule: Box<dyn Detector>) {
        self.rules.push(rule);
    }

    /// 등록된 규칙 이름 목록
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// 이벤트를 모든 규칙에 대해 평가합니다.
    pub fn evaluate(&self, event: &RuntimeEvent) -> Vec<Alert> {
        self.rules.iter().filter_map(|r| r.detect(event)).collect()
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}
