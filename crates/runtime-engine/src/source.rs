//! 커널 이벤트 소스: 원시 레코드 공급 추상화
//!
//! [`EventSource`]는 "다음 원시 레코드를 읽는다 (대기 가능), 유실 샘플 수를
//! 보고한다, 종료 상태를 보고한다"는 계약만 정의합니다. 수집 루프는 이 trait에만
//! 의존하므로 테스트에서는 메모리 기반 소스로 대체할 수 있습니다.
//!
//! # Linux perf 어댑터
//! [`PerfEventSource`]는 사전 빌드된 프로브 오브젝트를 `aya`로 로드하고,
//! 시스템 콜 트레이스포인트에 어태치한 뒤 `events` PerfEventArray를 CPU별로
//! 읽어 하나의 채널로 합칩니다.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────┐   ┌────────────────┐
//! │ tracepoints  │──▶│ events (per CPU) │──▶│ CPU readers │──▶│ PerfEventSource│
//! │ (kernel)     │   │ PerfEventArray   │   │ (tokio)     │   │ mpsc::Receiver │
//! └──────────────┘   └──────────────────┘   └─────────────┘   └────────────────┘
//! ```

use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(target_os = "linux")]
use tracing::{debug, info, warn};

use runsight_core::error::RunsightError;
#[cfg(not(target_os = "linux"))]
use runsight_core::error::DetectionError;

use crate::config::EngineConfig;

/// 커널 이벤트 소스에서 읽은 원시 레코드
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// 원시 샘플 바이트 (유실 알림만 있는 경우 비어 있음)
    pub data: Bytes,
    /// 이 레코드 직전에 커널이 보고한 유실 샘플 수
    pub lost_samples: u64,
}

impl RawRecord {
    /// 샘플 바이트로 레코드를 생성합니다.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            lost_samples: 0,
        }
    }

    /// 샘플 없이 유실 수만 전달하는 레코드
    pub fn lost(count: u64) -> Self {
        Self {
            data: Bytes::new(),
            lost_samples: count,
        }
    }
}

/// 이벤트 소스 읽기 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// 알 수 없는 종류의 perf 레코드
    #[error("unknown event kind")]
    UnknownEvent,

    /// 소스가 닫힘
    #[error("event source closed")]
    Closed,

    /// 그 밖의 읽기 실패
    #[error("read failed: {0}")]
    Read(String),
}

impl SourceError {
    /// 로그 없이 건너뛸 수 있는 조건인지 확인합니다.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UnknownEvent | Self::Closed)
    }
}

/// 원시 레코드 공급자
pub trait EventSource: Send {
    /// 다음 레코드를 읽습니다. 레코드가 없으면 대기합니다.
    fn next_record(&mut self) -> impl Future<Output = Result<RawRecord, SourceError>> + Send;
}

/// perf 샘플 한 개를 담을 버퍼 크기 (레코드 + perf 패딩 여유)
#[cfg(target_os = "linux")]
const SAMPLE_BUFFER_SIZE: usize = runsight_ebpf_common::EVENT_SIZE + 64;

/// CPU별 read_events 한 번에 꺼내는 최대 샘플 수
#[cfg(target_os = "linux")]
const SAMPLES_PER_READ: usize = 16;

/// aya PerfEventArray 기반 이벤트 소스 (Linux 전용)
///
/// CPU별 리더 태스크는 취소 토큰이 활성화되거나 소스가 drop되면 종료됩니다.
/// 로드된 프로브 핸들을 보유하여 트레이스포인트 어태치를 유지합니다.
pub struct PerfEventSource {
    rx: mpsc::Receiver<RawRecord>,
    readers: Vec<JoinHandle<()>>,
    #[cfg(target_os = "linux")]
    _bpf: aya::Ebpf,
}

impl PerfEventSource {
    /// 프로브를 로드/어태치하고 CPU별 리더를 시작합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    ///
    /// # 에러
    /// - `DetectionError::EbpfLoad`: 오브젝트 로드 실패
    /// - `DetectionError::EbpfAttach`: 트레이스포인트 로드/어태치 실패
    /// - `DetectionError::EbpfMap`: `events` 맵 또는 perf 버퍼 생성 실패
    #[cfg(target_os = "linux")]
    pub fn load(config: &EngineConfig, cancel: CancellationToken) -> Result<Self, RunsightError> {
        use aya::Ebpf;
        use aya::maps::perf::AsyncPerfEventArray;
        use aya::util::online_cpus;
        use runsight_core::error::DetectionError;
        use runsight_ebpf_common::{MAP_EVENTS, PROGRAMS, TRACEPOINT_CATEGORY};

        let path = config.object_path();
        info!(path = %path.display(), "loading kernel probe");

        let mut bpf = Ebpf::load_file(path)
            .map_err(|e| DetectionError::EbpfLoad(format!("{}: {e}", path.display())))?;

        for (program, tracepoint) in PROGRAMS {
            attach_tracepoint(&mut bpf, program, TRACEPOINT_CATEGORY, tracepoint)?;
        }

        let map = bpf
            .take_map(MAP_EVENTS)
            .ok_or_else(|| DetectionError::EbpfMap(format!("missing {MAP_EVENTS} map")))?;
        let mut perf_array = AsyncPerfEventArray::try_from(map)
            .map_err(|e| DetectionError::EbpfMap(format!("open {MAP_EVENTS} perf array: {e}")))?;

        let cpus = online_cpus().map_err(|(msg, e)| DetectionError::EbpfMap(format!("{msg}: {e}")))?;

        // 모든 버퍼를 연 뒤에 태스크를 시작 (중간 실패 시 남는 태스크 없음)
        let mut buffers = Vec::with_capacity(cpus.len());
        for cpu in cpus {
            let buf = perf_array
                .open(cpu, Some(config.ebpf.perf_buffer_pages))
                .map_err(|e| DetectionError::EbpfMap(format!("open perf buffer for cpu {cpu}: {e}")))?;
            buffers.push((cpu, buf));
        }

        let (tx, rx) = mpsc::channel(config.ebpf.record_channel_capacity);
        let readers = buffers
            .into_iter()
            .map(|(cpu, buf)| tokio::spawn(read_cpu(cpu, buf, tx.clone(), cancel.clone())))
            .collect::<Vec<_>>();

        info!(cpus = readers.len(), "kernel probe attached");

        Ok(Self {
            rx,
            readers,
            _bpf: bpf,
        })
    }

    /// 프로브를 로드합니다 (비-Linux 스텁).
    #[cfg(not(target_os = "linux"))]
    pub fn load(config: &EngineConfig, cancel: CancellationToken) -> Result<Self, RunsightError> {
        let _ = (config, cancel);
        Err(DetectionError::EbpfLoad("eBPF is only supported on Linux".to_owned()).into())
    }

    /// 실행 중인 CPU 리더 수
    pub fn reader_count(&self) -> usize {
        self.readers.iter().filter(|h| !h.is_finished()).count()
    }
}

impl EventSource for PerfEventSource {
    async fn next_record(&mut self) -> Result<RawRecord, SourceError> {
        self.rx.recv().await.ok_or(SourceError::Closed)
    }
}

impl Drop for PerfEventSource {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[cfg(target_os = "linux")]
fn attach_tracepoint(
    bpf: &mut aya::Ebpf,
    program_name: &str,
    category: &str,
    tracepoint: &str,
) -> Result<(), RunsightError> {
    use aya::programs::TracePoint;
    use runsight_core::error::DetectionError;

    let attach_err = |reason: String| DetectionError::EbpfAttach {
        program: program_name.to_owned(),
        reason,
    };

    let program = bpf
        .program_mut(program_name)
        .ok_or_else(|| attach_err("program not found in object".to_owned()))?;
    let program: &mut TracePoint = program
        .try_into()
        .map_err(|e| attach_err(format!("not a tracepoint program: {e}")))?;
    program
        .load()
        .map_err(|e| attach_err(format!("load failed: {e}")))?;
    program
        .attach(category, tracepoint)
        .map_err(|e| attach_err(format!("attach to {category}/{tracepoint} failed: {e}")))?;

    debug!(program = program_name, tracepoint, "tracepoint attached");
    Ok(())
}

/// CPU 하나의 perf 버퍼를 읽어 채널로 전달합니다.
#[cfg(target_os = "linux")]
async fn read_cpu(
    cpu: u32,
    mut buf: aya::maps::perf::AsyncPerfEventArrayBuffer<aya::maps::MapData>,
    tx: mpsc::Sender<RawRecord>,
    cancel: CancellationToken,
) {
    use bytes::BytesMut;

    let mut slots = (0..SAMPLES_PER_READ)
        .map(|_| BytesMut::with_capacity(SAMPLE_BUFFER_SIZE))
        .collect::<Vec<_>>();

    loop {
        let events = tokio::select! {
            _ = cancel.cancelled() => break,
            result = buf.read_events(&mut slots) => result,
        };

        let events = match events {
            Ok(events) => events,
            Err(e) => {
                warn!(cpu, error = %e, "perf buffer read failed, stopping reader");
                break;
            }
        };

        let mut lost = events.lost as u64;
        let mut records = slots
            .iter()
            .take(events.read)
            .map(|slot| RawRecord {
                data: Bytes::copy_from_slice(slot),
                lost_samples: std::mem::take(&mut lost),
            })
            .collect::<Vec<_>>();
        if records.is_empty() && lost > 0 {
            records.push(RawRecord::lost(lost));
        }

        for record in records {
            let sent = tokio::select! {
                _ = cancel.cancelled() => false,
                result = tx.send(record) => result.is_ok(),
            };
            if !sent {
                debug!(cpu, "perf reader stopping");
                return;
            }
        }

        for slot in slots.iter_mut() {
            slot.clear();
        }
    }

    debug!(cpu, "perf reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_errors() {
        assert!(SourceError::UnknownEvent.is_benign());
        assert!(SourceError::Closed.is_benign());
        assert!(!SourceError::Read("EIO".to_owned()).is_benign());
    }

    #[test]
    fn test_raw_record_constructors() {
        let record = RawRecord::new(vec![1u8, 2, 3]);
        assert_eq!(record.data.len(), 3);
        assert_eq!(record.lost_samples, 0);

        let lost = RawRecord::lost(5);
        assert!(lost.data.is_empty());
        assert_eq!(lost.lost_samples, 5);
    }

    #[cfg(not(target_os = "linux"))]
    #[tokio::test]
    async fn test_load_fails_off_linux() {
        let result = PerfEventSource::load(&EngineConfig::default(), CancellationToken::new());
        assert!(result.is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_load_missing_object_fails() {
        let mut config = EngineConfig::default();
        config.ebpf.object_path = "/nonexistent/process_monitor.bpf.o".to_owned();
        let result = PerfEventSource::load(&config, CancellationToken::new());
        assert!(matches!(
            result,
            Err(RunsightError::Detection(
                runsight_core::error::DetectionError::EbpfLoad(_)
            ))
        ));
    }
}
