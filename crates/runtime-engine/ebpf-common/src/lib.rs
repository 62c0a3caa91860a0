//! eBPF 커널/유저스페이스 공유 타입
//!
//! 이 크레이트는 `#![no_std]` 환경에서 사용 가능한 공통 타입을 정의합니다.
//! 커널 프로브(`process_monitor.bpf.o`)와 유저스페이스가 동일한 메모리
//! 레이아웃(`#[repr(C)]`)을 사용하도록 보장합니다.
//!
//! # 전달 경로
//! 커널 프로브는 시스템 콜 트레이스포인트에서 [`ProcessEventData`]를 채워
//! `events` PerfEventArray로 전송합니다. CPU별 perf 버퍼는 샘플을 패딩할 수
//! 있으므로, 유저스페이스는 앞쪽 [`EVENT_SIZE`] 바이트만 해석합니다.

#![no_std]

// =============================================================================
// 맵 / 프로그램 이름 상수
// =============================================================================

/// 이벤트 PerfEventArray 맵 이름
pub const MAP_EVENTS: &str = "events";

/// 트레이스포인트 카테고리
pub const TRACEPOINT_CATEGORY: &str = "syscalls";

/// (프로그램 이름, 트레이스포인트 이름) 목록
///
/// 커널 프로브 오브젝트에 정의된 순서와 같습니다.
pub const PROGRAMS: [(&str, &str); 5] = [
    ("handle_execve", "sys_enter_execve"),
    ("handle_connect", "sys_enter_connect"),
    ("handle_ptrace", "sys_enter_ptrace"),
    ("handle_memfd", "sys_enter_memfd_create"),
    ("handle_mmap", "sys_enter_mmap"),
];

// =============================================================================
// 필드 크기 상수
// =============================================================================

/// 프로세스명 버퍼 크기 (커널 TASK_COMM_LEN)
pub const TASK_COMM_LEN: usize = 16;
/// 실행 경로 버퍼 크기
pub const FILENAME_LEN: usize = 256;
/// 이벤트 유형 태그 버퍼 크기
pub const EVENT_TYPE_LEN: usize = 16;

/// 레코드 전체 크기 (바이트)
pub const EVENT_SIZE: usize = core::mem::size_of::<ProcessEventData>();

// =============================================================================
// 공유 데이터 구조
// =============================================================================

/// 프로세스 이벤트 데이터
///
/// 정수 필드는 리틀 엔디언(호스트 오더), `dst_ip`/`dst_port`는
/// 네트워크 바이트 오더입니다.
///
/// # 메모리 레이아웃 (320 바이트, 8바이트 정렬)
/// ```text
/// offset  field       size
/// 0       pid         4
/// 4       ppid        4
/// 8       uid         4
/// 12      gid         4
/// 16      cgroup_id   8
/// 24      dst_ip      4
/// 28      dst_port    2
/// 30      proto       1
/// 31      _pad        1
/// 32      comm        16
/// 48      filename    256
/// 304     event_type  16
/// ```
#[repr(C)]
#[derive(Clone, Copy)]
#[cfg_attr(feature = "user", derive(Debug))]
pub struct ProcessEventData {
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
    /// 목적지 IPv4 주소 (네트워크 바이트 오더)
    pub dst_ip: u32,
    /// 목적지 포트 (네트워크 바이트 오더)
    pub dst_port: u16,
    /// IP 프로토콜 번호
    pub proto: u8,
    /// 정렬 패딩
    pub _pad: u8,
    /// 프로세스명
    pub comm: [u8; TASK_COMM_LEN],
    /// 실행 경로 또는 memfd 이름
    pub filename: [u8; FILENAME_LEN],
    /// 이벤트 유형 태그 (exec, connect, ptrace, mmap_exec, memfd)
    pub event_type: [u8; EVENT_TYPE_LEN],
}

// SAFETY: ProcessEventData는 #[repr(C)]이며 모든 필드가 Plain Old Data입니다.
// 암묵적 패딩이 없도록 `_pad`가 명시되어 있습니다.
#[cfg(feature = "user")]
unsafe impl aya::Pod for ProcessEventData {}

impl ProcessEventData {
    /// 제로 초기화된 이벤트 데이터를 생성합니다.
    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            ppid: 0,
            uid: 0,
            gid: 0,
            cgroup_id: 0,
            dst_ip: 0,
            dst_port: 0,
            proto: 0,
            _pad: 0,
            comm: [0; TASK_COMM_LEN],
            filename: [0; FILENAME_LEN],
            event_type: [0; EVENT_TYPE_LEN],
        }
    }
}

// 레이아웃은 커널 프로브와의 계약이므로 컴파일 타임에 고정
const _: () = {
    use core::mem::offset_of;
    assert!(EVENT_SIZE == 320);
    assert!(offset_of!(ProcessEventData, cgroup_id) == 16);
    assert!(offset_of!(ProcessEventData, dst_ip) == 24);
    assert!(offset_of!(ProcessEventData, dst_port) == 28);
    assert!(offset_of!(ProcessEventData, proto) == 30);
    assert!(offset_of!(ProcessEventData, comm) == 32);
    assert!(offset_of!(ProcessEventData, filename) == 48);
    assert!(offset_of!(ProcessEventData, event_type) == 304);
};
