#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use runsight_core::event::{Event, RuntimeEvent};
use runsight_engine::DetectionEngine;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzEvent {
    pid: u32,
    ppid: u32,
    uid: u32,
    dst_ip: u32,
    dst_port: u16,
    comm: String,
    filename: String,
    kind: FuzzKind,
}

#[derive(Arbitrary, Debug)]
enum FuzzKind {
    Exec,
    Connect,
    Ptrace,
    MmapExec,
    Memfd,
    Other(String),
}

impl FuzzKind {
    fn as_str(&self) -> &str {
        match self {
            FuzzKind::Exec => "exec",
            FuzzKind::Connect => "connect",
            FuzzKind::Ptrace => "ptrace",
            FuzzKind::MmapExec => "mmap_exec",
            FuzzKind::Memfd => "memfd",
            FuzzKind::Other(s) => s,
        }
    }
}

fuzz_target!(|input: FuzzEvent| {
    let event = RuntimeEvent::from_event(Event {
        pid: input.pid,
        ppid: input.ppid,
        uid: input.uid,
        dst_ip: input.dst_ip,
        dst_port: input.dst_port,
        comm: input.comm.as_str().into(),
        filename: input.filename.as_str().into(),
        event_type: input.kind.as_str().into(),
        ..Default::default()
    });

    let alerts = DetectionEngine::with_default_rules().evaluate(&event);

    // 규칙들의 이벤트 종류가 서로 겹치지 않으므로 최대 1개
    assert!(alerts.len() <= 1);
    for alert in alerts {
        assert!(alert.to_json().is_ok());
    }
});
