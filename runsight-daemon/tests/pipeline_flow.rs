//! End-to-end pipeline tests.
//!
//! Raw 320-byte records are pushed through an in-memory source; alerts are
//! read back from the real HTTP gateway as Server-Sent Events.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use runsight_core::config::RunsightConfig;
use runsight_daemon::orchestrator::Orchestrator;
use runsight_engine::runsight_ebpf_common::EVENT_SIZE;
use runsight_engine::{EventSource, IngestStats, ProcfsResolver, RawRecord, SourceError};

const WAIT: Duration = Duration::from_secs(5);
const CONTAINER_ID: &str = "3f4e5d6c7b8a90123456789abcdef0123456789abcdef0123456789abcdef012";

// ===== fixtures =====

struct ChannelSource {
    rx: mpsc::Receiver<RawRecord>,
}

impl EventSource for ChannelSource {
    async fn next_record(&mut self) -> Result<RawRecord, SourceError> {
        self.rx.recv().await.ok_or(SourceError::Closed)
    }
}

#[derive(Default)]
struct RecordSpec<'a> {
    pid: u32,
    ppid: u32,
    uid: u32,
    dst_ip: [u8; 4],
    dst_port: u16,
    comm: &'a str,
    filename: &'a str,
    event_type: &'a str,
}

fn record(spec: RecordSpec<'_>) -> Vec<u8> {
    let mut buf = vec![0u8; EVENT_SIZE];
    buf[0..4].copy_from_slice(&spec.pid.to_le_bytes());
    buf[4..8].copy_from_slice(&spec.ppid.to_le_bytes());
    buf[8..12].copy_from_slice(&spec.uid.to_le_bytes());
    buf[16..24].copy_from_slice(&99u64.to_le_bytes());
    buf[24..28].copy_from_slice(&spec.dst_ip);
    buf[28..30].copy_from_slice(&spec.dst_port.to_be_bytes());
    buf[32..32 + spec.comm.len()].copy_from_slice(spec.comm.as_bytes());
    buf[48..48 + spec.filename.len()].copy_from_slice(spec.filename.as_bytes());
    buf[304..304 + spec.event_type.len()].copy_from_slice(spec.event_type.as_bytes());
    buf
}

fn fake_proc(root: &Path) {
    let pid_dir = root.join("4242");
    std::fs::create_dir_all(&pid_dir).unwrap();
    std::fs::write(
        pid_dir.join("cgroup"),
        format!("0::/kubepods/besteffort/pod1234/{CONTAINER_ID}\n"),
    )
    .unwrap();

    let kernel = root.join("sys/kernel");
    std::fs::create_dir_all(&kernel).unwrap();
    std::fs::write(kernel.join("hostname"), "web-7d9f\n").unwrap();
}

fn test_config() -> RunsightConfig {
    let mut config = RunsightConfig::default();
    config.stream.listen_addr = "127.0.0.1:0".to_owned();
    config.pod.namespace = "payments".to_owned();
    config.pod.node = "node-a".to_owned();
    config
}

struct Daemon {
    addr: SocketAddr,
    cancel: CancellationToken,
    records: mpsc::Sender<RawRecord>,
    task: JoinHandle<Result<IngestStats>>,
    _proc: tempfile::TempDir,
}

async fn start_daemon() -> Daemon {
    let proc_root = tempfile::tempdir().unwrap();
    fake_proc(proc_root.path());

    let config = test_config();
    let resolver = ProcfsResolver::with_proc_root(proc_root.path(), &config.pod).unwrap();
    let orchestrator = Orchestrator::build(config).await.unwrap();
    let addr = orchestrator.local_addr().unwrap();
    let cancel = orchestrator.cancel_token();

    let (records, rx) = mpsc::channel(16);
    let task = tokio::spawn(orchestrator.run_with_source(ChannelSource { rx }, resolver));

    Daemon {
        addr,
        cancel,
        records,
        task,
        _proc: proc_root,
    }
}

async fn open_events(addr: SocketAddr) -> BufReader<TcpStream> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /events HTTP/1.1\r\nHost: runsight\r\n\r\n")
        .await
        .unwrap();
    let mut reader = BufReader::new(stream);
    loop {
        let mut line = String::new();
        let n = timeout(WAIT, reader.read_line(&mut line)).await.unwrap().unwrap();
        assert!(n > 0, "stream closed before headers");
        if line == "\r\n" {
            return reader;
        }
    }
}

async fn next_alert(reader: &mut BufReader<TcpStream>) -> serde_json::Value {
    let mut line = String::new();
    timeout(WAIT, reader.read_line(&mut line)).await.unwrap().unwrap();
    let mut blank = String::new();
    timeout(WAIT, reader.read_line(&mut blank)).await.unwrap().unwrap();
    let data = line.strip_prefix("data: ").unwrap().trim_end();
    serde_json::from_str(data).unwrap()
}

async fn stop(daemon: Daemon) -> IngestStats {
    daemon.cancel.cancel();
    timeout(Duration::from_secs(15), daemon.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

// ===== tests =====

#[tokio::test]
async fn reverse_shell_reaches_sse_subscriber() {
    let daemon = start_daemon().await;
    let mut events = open_events(daemon.addr).await;

    daemon
        .records
        .send(RawRecord::new(record(RecordSpec {
            pid: 4242,
            ppid: 100,
            uid: 1000,
            dst_ip: [10, 0, 0, 1],
            dst_port: 4444,
            comm: "bash",
            event_type: "connect",
            ..Default::default()
        })))
        .await
        .unwrap();

    let alert = next_alert(&mut events).await;
    assert_eq!(alert["rule_id"], "reverse_shell");
    assert_eq!(alert["severity"], "high");
    assert_eq!(alert["risk_score"], 85);
    assert_eq!(alert["event"]["pid"], 4242);
    assert_eq!(alert["event"]["dst_port"], 4444);
    assert_eq!(alert["event"]["addr"], "10.0.0.1:4444");
    assert_eq!(alert["event"]["comm"], "bash");
    assert_eq!(alert["event"]["container"]["id"], CONTAINER_ID);
    assert_eq!(alert["event"]["container"]["name"], &CONTAINER_ID[..12]);
    assert_eq!(alert["event"]["pod"]["name"], "web-7d9f");
    assert_eq!(alert["event"]["pod"]["namespace"], "payments");
    assert_eq!(alert["event"]["pod"]["node"], "node-a");

    let stats = stop(daemon).await;
    assert_eq!(stats.records, 1);
    assert_eq!(stats.alerts_raised, 1);
    assert_eq!(stats.alerts_dropped, 0);
}

#[tokio::test]
async fn bad_records_are_skipped() {
    let daemon = start_daemon().await;
    let mut events = open_events(daemon.addr).await;

    daemon.records.send(RawRecord::lost(3)).await.unwrap();
    daemon.records.send(RawRecord::new(vec![0u8; 12])).await.unwrap();
    // benign: no alert
    daemon
        .records
        .send(RawRecord::new(record(RecordSpec {
            pid: 7,
            ppid: 300,
            uid: 1000,
            comm: "ls",
            filename: "/usr/bin/ls",
            event_type: "exec",
            ..Default::default()
        })))
        .await
        .unwrap();
    daemon
        .records
        .send(RawRecord::new(record(RecordSpec {
            pid: 9999,
            comm: "gdb",
            event_type: "ptrace",
            ..Default::default()
        })))
        .await
        .unwrap();

    let alert = next_alert(&mut events).await;
    assert_eq!(alert["rule_id"], "process_injection");
    assert_eq!(alert["risk_score"], 90);
    // no /proc/9999 in the fake tree
    assert_eq!(alert["event"]["container"]["id"], "host");

    let stats = stop(daemon).await;
    assert_eq!(stats.lost_samples, 3);
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.records, 3);
    assert_eq!(stats.alerts_raised, 1);
}

#[tokio::test]
async fn alerts_fan_out_to_every_subscriber() {
    let daemon = start_daemon().await;
    let mut first = open_events(daemon.addr).await;
    let mut second = open_events(daemon.addr).await;

    daemon
        .records
        .send(RawRecord::new(record(RecordSpec {
            pid: 4242,
            ppid: 1,
            uid: 1000,
            comm: "sh",
            filename: "/tmp/dropper",
            event_type: "exec",
            ..Default::default()
        })))
        .await
        .unwrap();

    for events in [&mut first, &mut second] {
        let alert = next_alert(events).await;
        assert_eq!(alert["rule_id"], "suspicious_exec");
        assert_eq!(alert["event"]["filename"], "/tmp/dropper");
    }

    stop(daemon).await;
}

#[tokio::test]
async fn shutdown_closes_event_streams() {
    let daemon = start_daemon().await;
    let mut events = open_events(daemon.addr).await;

    let Daemon { cancel, task, .. } = daemon;
    cancel.cancel();

    let mut rest = String::new();
    timeout(WAIT, events.read_to_string(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    let stats = timeout(Duration::from_secs(15), task).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.records, 0);
}

#[tokio::test]
async fn healthz_served_while_running() {
    let daemon = start_daemon().await;

    let mut stream = TcpStream::connect(daemon.addr).await.unwrap();
    stream.write_all(b"GET /healthz HTTP/1.1\r\n\r\n").await.unwrap();
    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("ok"));

    stop(daemon).await;
}

#[tokio::test]
async fn build_fails_when_port_taken() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = test_config();
    config.stream.listen_addr = taken.local_addr().unwrap().to_string();

    let err = Orchestrator::build(config).await.err().unwrap();
    assert!(err.to_string().contains("HTTP listener"));
}
