//! 이벤트 타입: 커널 이벤트 레코드와 보강(enrichment)된 런타임 이벤트
//!
//! [`Event`]는 커널 프로브가 전송한 고정 레이아웃 레코드를 디코딩한 결과이며,
//! [`RuntimeEvent`]는 여기에 컨테이너/파드 식별 정보와 캡처 시각을 덧붙인
//! 합성(composition) 타입입니다.
//!
//! # 고정 길이 문자열
//! 커널 레코드의 문자열 필드는 길이 접두사가 없는 고정 크기 바이트 버퍼입니다.
//! 논리 문자열은 첫 번째 0 바이트 이전까지이며, 0 바이트가 없으면 버퍼 전체입니다.
//! [`FixedStr`]가 이 규칙을 캡슐화합니다.

use std::borrow::Cow;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::types::{ContainerIdentity, PodIdentity};

// --- 필드 크기 상수 ---

/// 프로세스명(comm) 버퍼 크기
pub const COMM_LEN: usize = 16;
/// 실행 경로(filename) 버퍼 크기
pub const FILENAME_LEN: usize = 256;
/// 이벤트 유형 태그 버퍼 크기
pub const EVENT_TYPE_LEN: usize = 16;

// --- 이벤트 유형 상수 ---

/// execve 호출
pub const EVENT_TYPE_EXEC: &str = "exec";
/// connect 호출
pub const EVENT_TYPE_CONNECT: &str = "connect";
/// ptrace 호출
pub const EVENT_TYPE_PTRACE: &str = "ptrace";
/// PROT_EXEC 권한의 mmap 호출
pub const EVENT_TYPE_MMAP_EXEC: &str = "mmap_exec";
/// memfd_create 호출
pub const EVENT_TYPE_MEMFD: &str = "memfd";

/// 고정 용량 바이트 문자열
///
/// 커널이 채운 바이트를 그대로 보관하며, 문자셋 검증을 하지 않습니다.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize>([u8; N]);

impl<const N: usize> FixedStr<N> {
    /// 원시 바이트 배열로 생성합니다.
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// 0으로 채워진 (빈) 문자열을 생성합니다.
    pub const fn zeroed() -> Self {
        Self([0; N])
    }

    /// 버퍼 용량
    pub const fn capacity(&self) -> usize {
        N
    }

    /// 원시 버퍼 전체
    pub fn as_raw(&self) -> &[u8; N] {
        &self.0
    }

    /// 첫 번째 0 바이트 이전의 논리 문자열 바이트
    pub fn logical(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..end]
    }

    /// 논리 문자열을 UTF-8로 변환합니다 (유효하지 않은 바이트는 대체 문자).
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.logical())
    }

    /// 논리 문자열이 `s`와 정확히 일치하는지 확인합니다.
    pub fn is(&self, s: &str) -> bool {
        self.logical() == s.as_bytes()
    }

    /// 논리 문자열이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.logical().is_empty()
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// 용량을 초과하는 입력은 잘립니다.
impl<const N: usize> From<&str> for FixedStr<N> {
    fn from(s: &str) -> Self {
        let mut buf = [0u8; N];
        let len = s.len().min(N);
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self(buf)
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize> Serialize for FixedStr<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

/// 디코딩된 커널 이벤트 레코드
///
/// `dst_ip`와 `dst_port`는 디코더가 네트워크 바이트 오더에서
/// 호스트 값으로 변환한 결과입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Event {
    /// 프로세스 ID (tgid)
    pub pid: u32,
    /// 부모 프로세스 ID
    pub ppid: u32,
    /// 사용자 ID
    pub uid: u32,
    /// 그룹 ID
    pub gid: u32,
    /// cgroup ID
    pub cgroup_id: u64,
    /// 목적지 IPv4 주소 (0 = 없음)
    #[serde(serialize_with = "serialize_ipv4")]
    pub dst_ip: u32,
    /// 목적지 포트 (0 = 없음)
    pub dst_port: u16,
    /// IP 프로토콜 번호
    pub proto: u8,
    /// 프로세스명
    pub comm: FixedStr<COMM_LEN>,
    /// 실행 경로 또는 memfd 이름
    pub filename: FixedStr<FILENAME_LEN>,
    /// 이벤트 유형 태그
    pub event_type: FixedStr<EVENT_TYPE_LEN>,
}

impl Event {
    /// 이벤트 유형이 `kind`인지 확인합니다.
    pub fn is_type(&self, kind: &str) -> bool {
        self.event_type.is(kind)
    }

    /// 목적지 주소 (IP가 0이면 `None`)
    pub fn dst_addr(&self) -> Option<Ipv4Addr> {
        (self.dst_ip != 0).then(|| Ipv4Addr::from(self.dst_ip))
    }

    /// 사람이 읽을 수 있는 목적지 문자열
    ///
    /// IP가 0이면 빈 문자열, 포트가 0이면 포트 구간을 생략합니다.
    pub fn destination(&self) -> String {
        match self.dst_addr() {
            None => String::new(),
            Some(ip) if self.dst_port == 0 => ip.to_string(),
            Some(ip) => format!("{}:{}", ip, self.dst_port),
        }
    }
}

fn serialize_ipv4<S: Serializer>(ip: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&Ipv4Addr::from(*ip))
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pid={} ppid={} uid={} comm={}",
            self.event_type, self.pid, self.ppid, self.uid, self.comm,
        )
    }
}

/// 식별 정보가 보강된 런타임 이벤트
///
/// 레코드 하나당 한 번 생성되며, 보강 이후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeEvent {
    /// 원본 커널 이벤트
    #[serde(flatten)]
    pub event: Event,
    /// 컨테이너 식별 정보
    pub container: ContainerIdentity,
    /// 파드 식별 정보
    pub pod: PodIdentity,
    /// 캡처 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 목적지 주소 문자열 (IP가 0이면 빈 문자열)
    pub addr: String,
}

impl RuntimeEvent {
    /// 식별 정보 없이 런타임 이벤트를 생성합니다.
    ///
    /// 컨테이너/파드 정보는 빈 값이며 캡처 시각은 현재 시각입니다.
    pub fn from_event(event: Event) -> Self {
        Self {
            addr: event.destination(),
            event,
            container: ContainerIdentity::default(),
            pod: PodIdentity::default(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} container={} pod={}", self.event, self.container, self.pod)?;
        if !self.addr.is_empty() {
            write!(f, " dst={}", self.addr)?;
        }
        Ok(())
    }
}
