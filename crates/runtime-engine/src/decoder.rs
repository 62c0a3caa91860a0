//! 이벤트 디코더: 고정 레이아웃 원시 레코드 → [`Event`]
//!
//! 레코드 레이아웃은 [`ProcessEventData`]가 정의합니다. 버퍼는 신뢰할 수 없는
//! 입력으로 취급하며, 레코드 크기보다 짧으면 어떤 필드도 읽지 않고
//! [`DecodeError::TooShort`]를 반환합니다. perf 샘플은 뒤쪽이 패딩될 수 있으므로
//! 레코드 크기를 초과하는 바이트는 무시합니다.
//!
//! # 바이트 오더
//! - 정수 필드: 리틀 엔디언
//! - `dst_ip`, `dst_port`: 네트워크 바이트 오더 → 호스트 값으로 변환

use std::mem::offset_of;

use runsight_core::error::DecodeError;
use runsight_core::event::{Event, FixedStr};
use runsight_ebpf_common::{
    EVENT_SIZE, EVENT_TYPE_LEN, FILENAME_LEN, ProcessEventData, TASK_COMM_LEN,
};

const OFF_PID: usize = offset_of!(ProcessEventData, pid);
const OFF_PPID: usize = offset_of!(ProcessEventData, ppid);
const OFF_UID: usize = offset_of!(ProcessEventData, uid);
const OFF_GID: usize = offset_of!(ProcessEventData, gid);
const OFF_CGROUP_ID: usize = offset_of!(ProcessEventData, cgroup_id);
const OFF_DST_IP: usize = offset_of!(ProcessEventData, dst_ip);
const OFF_DST_PORT: usize = offset_of!(ProcessEventData, dst_port);
const OFF_PROTO: usize = offset_of!(ProcessEventData, proto);
const OFF_COMM: usize = offset_of!(ProcessEventData, comm);
const OFF_FILENAME: usize = offset_of!(ProcessEventData, filename);
const OFF_EVENT_TYPE: usize = offset_of!(ProcessEventData, event_type);

/// 원시 레코드를 디코딩합니다.
///
/// 순수 함수이며 동시에 호출해도 안전합니다.
pub fn decode(buf: &[u8]) -> Result<Event, DecodeError> {
    let Some((record, _padding)) = buf.split_first_chunk::<EVENT_SIZE>() else {
        return Err(DecodeError::TooShort {
            len: buf.len(),
            expected: EVENT_SIZE,
        });
    };

    Ok(Event {
        pid: u32::from_le_bytes(field(record, OFF_PID)),
        ppid: u32::from_le_bytes(field(record, OFF_PPID)),
        uid: u32::from_le_bytes(field(record, OFF_UID)),
        gid: u32::from_le_bytes(field(record, OFF_GID)),
        cgroup_id: u64::from_le_bytes(field(record, OFF_CGROUP_ID)),
        dst_ip: u32::from_be_bytes(field(record, OFF_DST_IP)),
        dst_port: u16::from_be_bytes(field(record, OFF_DST_PORT)),
        proto: record[OFF_PROTO],
        comm: FixedStr::new(field::<TASK_COMM_LEN>(record, OFF_COMM)),
        filename: FixedStr::new(field::<FILENAME_LEN>(record, OFF_FILENAME)),
        event_type: FixedStr::new(field::<EVENT_TYPE_LEN>(record, OFF_EVENT_TYPE)),
    })
}

/// 레코드의 `offset`부터 `N` 바이트를 복사합니다.
///
/// 오프셋은 [`ProcessEventData`]에서 온 상수이므로 항상 레코드 범위 안입니다.
fn field<const N: usize>(record: &[u8; EVENT_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&record[offset..offset + N]);
    out
}
