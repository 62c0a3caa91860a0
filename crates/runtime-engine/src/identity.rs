//! 워크로드 식별: procfs 기반 컨테이너/파드 식별 정보 조회
//!
//! [`ProcfsResolver`]는 `/proc/<pid>/cgroup`에서 컨테이너 ID를 찾고,
//! 설정/호스트 이름에서 파드 식별 정보를 구성합니다.
//!
//! 조회 실패는 에러가 아닌 센티널로 표현됩니다:
//! - cgroup 파일을 열 수 없음 → `host`
//! - 읽었지만 컨테이너 ID 없음 → `cgid`
//! - 읽는 도중 실패 → `error`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use regex::bytes::Regex;
use tracing::{debug, trace};

use runsight_core::config::PodConfig;
use runsight_core::error::{PipelineError, RunsightError};
use runsight_core::pipeline::IdentityResolver;
use runsight_core::types::{ContainerIdentity, PodIdentity};

/// cgroup 경로에 포함된 컨테이너 ID 패턴
const CONTAINER_ID_PATTERN: &str = "[0-9a-f]{32,64}";

/// 호스트 이름을 읽을 수 없을 때의 파드 이름
const UNKNOWN_HOSTNAME: &str = "unknown";

/// procfs 기반 식별 리졸버
pub struct ProcfsResolver {
    proc_root: PathBuf,
    container_id: Regex,
    pod: PodIdentity,
}

impl ProcfsResolver {
    /// `/proc`을 사용하는 리졸버를 생성합니다.
    pub fn new(pod: &PodConfig) -> Result<Self, RunsightError> {
        Self::with_proc_root("/proc", pod)
    }

    /// 지정한 procfs 루트를 사용하는 리졸버를 생성합니다.
    ///
    /// 파드 식별 정보는 생성 시 한 번만 구성됩니다.
    pub fn with_proc_root(
        proc_root: impl Into<PathBuf>,
        pod: &PodConfig,
    ) -> Result<Self, RunsightError> {
        let proc_root = proc_root.into();
        let container_id = Regex::new(CONTAINER_ID_PATTERN).map_err(|e| {
            PipelineError::InitFailed(format!("invalid container id pattern: {e}"))
        })?;

        let name = if pod.name.is_empty() {
            read_hostname(&proc_root)
        } else {
            pod.name.clone()
        };
        let pod = PodIdentity {
            name,
            namespace: pod.namespace.clone(),
            node: pod.node.clone(),
        };
        debug!(pod = %pod, "pod identity resolved");

        Ok(Self {
            proc_root,
            container_id,
            pod,
        })
    }

    fn scan_cgroup(&self, reader: impl BufRead) -> ContainerIdentity {
        let mut reader = reader;
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => return ContainerIdentity::unresolved(),
                Ok(_) => {
                    if let Some(m) = self.container_id.find(&line) {
                        // 패턴이 ASCII hex만 매칭하므로 손실 없음
                        let id = String::from_utf8_lossy(m.as_bytes());
                        return ContainerIdentity::from_cgroup_id(id);
                    }
                }
                Err(_) => return ContainerIdentity::lookup_failed(),
            }
        }
    }
}

impl IdentityResolver for ProcfsResolver {
    fn resolve_container(&self, pid: u32, cgroup_id: u64) -> ContainerIdentity {
        let path = self.proc_root.join(pid.to_string()).join("cgroup");
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                trace!(pid, cgroup_id, error = %e, "cgroup record unavailable");
                return ContainerIdentity::host();
            }
        };

        let identity = self.scan_cgroup(BufReader::new(file));
        trace!(pid, cgroup_id, container = %identity, "container identity resolved");
        identity
    }

    fn resolve_pod(&self) -> PodIdentity {
        self.pod.clone()
    }
}

/// `<proc_root>/sys/kernel/hostname`에서 호스트 이름을 읽습니다.
///
/// 개행 문자는 제거하며, 읽을 수 없거나 비어 있으면 `unknown`을 반환합니다.
fn read_hostname(proc_root: &Path) -> String {
    match std::fs::read_to_string(proc_root.join("sys/kernel/hostname")) {
        Ok(raw) => {
            let name = raw.replace('\n', "");
            if name.is_empty() {
                UNKNOWN_HOSTNAME.to_owned()
            } else {
                name
            }
        }
        Err(_) => UNKNOWN_HOSTNAME.to_owned(),
    }
}
