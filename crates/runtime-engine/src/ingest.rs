//! 수집 루프: 원시 레코드 → 디코딩 → 식별 보강 → 탐지 → 수집 큐
//!
//! [`IngestionLoop`]는 레코드를 하나씩 순차 처리하여 순서를 보존합니다.
//! 수집 큐가 가득 차면 알림을 버리고 로그를 남기며, 커널 이벤트 읽기를
//! 절대 막지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! let (alert_tx, alert_rx) = mpsc::channel(1024);
//! let ingest = IngestionLoop::builder()
//!     .source(source)
//!     .resolver(resolver)
//!     .alert_sender(alert_tx)
//!     .build()?;
//!
//! let stats = ingest.run(cancel.clone()).await;
//! ```

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use runsight_core::error::{PipelineError, RunsightError};
use runsight_core::event::{Event, RuntimeEvent};
use runsight_core::metrics as m;
use runsight_core::pipeline::IdentityResolver;
use runsight_core::types::Alert;

use crate::decoder::decode;
use crate::detector::DetectionEngine;
use crate::source::{EventSource, RawRecord, SourceError};

/// 소스가 닫힌 뒤 다시 읽기까지 대기 시간
const CLOSED_BACKOFF: Duration = Duration::from_millis(100);

/// 수집 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// 처리한 원시 레코드 수
    pub records: u64,
    /// 커널이 보고한 유실 샘플 수
    pub lost_samples: u64,
    /// 디코딩 실패 수
    pub decode_failures: u64,
    /// 생성된 알림 수
    pub alerts_raised: u64,
    /// 수집 큐 포화/종료로 버려진 알림 수
    pub alerts_dropped: u64,
}

/// 수집 루프
pub struct IngestionLoop<S, R> {
    source: S,
    resolver: R,
    engine: DetectionEngine,
    alert_tx: mpsc::Sender<Alert>,
    stats: IngestStats,
}

/// 수집 루프 빌더
pub struct IngestionLoopBuilder<S, R> {
    source: Option<S>,
    resolver: Option<R>,
    engine: Option<DetectionEngine>,
    alert_tx: Option<mpsc::Sender<Alert>>,
}

impl<S, R> IngestionLoopBuilder<S, R>
where
    S: EventSource,
    R: IdentityResolver,
{
    fn new() -> Self {
        Self {
            source: None,
            resolver: None,
            engine: None,
            alert_tx: None,
        }
    }

    /// 원시 레코드 소스를 지정합니다.
    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    /// 식별 리졸버를 지정합니다.
    pub fn resolver(mut self, resolver: R) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// 탐지 엔진을 지정합니다 (기본: 기본 규칙 집합).
    pub fn engine(mut self, engine: DetectionEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 수집 큐 송신자를 지정합니다.
    pub fn alert_sender(mut self, tx: mpsc::Sender<Alert>) -> Self {
        self.alert_tx = Some(tx);
        self
    }

    /// 수집 루프를 생성합니다.
    ///
    /// # 에러
    /// - `PipelineError::InitFailed`: 소스/리졸버/송신자 중 하나라도 누락된 경우
    pub fn build(self) -> Result<IngestionLoop<S, R>, RunsightError> {
        let missing = |what: &str| PipelineError::InitFailed(format!("{what} is required"));
        Ok(IngestionLoop {
            source: self.source.ok_or_else(|| missing("source"))?,
            resolver: self.resolver.ok_or_else(|| missing("resolver"))?,
            engine: self.engine.unwrap_or_default(),
            alert_tx: self.alert_tx.ok_or_else(|| missing("alert sender"))?,
            stats: IngestStats::default(),
        })
    }
}

impl<S, R> IngestionLoop<S, R>
where
    S: EventSource,
    R: IdentityResolver,
{
    /// 빌더를 반환합니다.
    pub fn builder() -> IngestionLoopBuilder<S, R> {
        IngestionLoopBuilder::new()
    }

    /// 현재까지의 수집 통계
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// 취소될 때까지 레코드를 처리하고 최종 통계를 반환합니다.
    ///
    /// 매 반복마다 취소 여부를 먼저 확인하고, 레코드 대기 중에도 취소에 반응합니다.
    /// 루프가 끝나면 수집 큐 송신자가 drop되어 브로드캐스터가 종료됩니다.
    pub async fn run(mut self, cancel: CancellationToken) -> IngestStats {
        info!("ingestion loop started; listening for kernel events");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.source.next_record() => result,
            };

            match result {
                Ok(record) => self.process(record),
                Err(SourceError::Closed) => {
                    trace!("event source closed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(CLOSED_BACKOFF) => {}
                    }
                }
                Err(e) if e.is_benign() => trace!(error = %e, "skipping benign read condition"),
                Err(e) => warn!(error = %e, "read kernel event failed"),
            }
        }

        let stats = self.stats;
        info!(
            records = stats.records,
            lost_samples = stats.lost_samples,
            decode_failures = stats.decode_failures,
            alerts_raised = stats.alerts_raised,
            alerts_dropped = stats.alerts_dropped,
            "ingestion loop stopped"
        );
        stats
    }

    /// 레코드 하나를 처리합니다.
    fn process(&mut self, record: RawRecord) {
        if record.lost_samples > 0 {
            self.stats.lost_samples += record.lost_samples;
            metrics::counter!(m::INGEST_LOST_SAMPLES_TOTAL).increment(record.lost_samples);
            warn!(lost = record.lost_samples, "kernel reported lost samples");
        }

        // 유실 알림만 담긴 레코드
        if record.data.is_empty() && record.lost_samples > 0 {
            return;
        }

        self.stats.records += 1;
        metrics::counter!(m::INGEST_RECORDS_TOTAL).increment(1);

        let event = match decode(&record.data) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_failures += 1;
                metrics::counter!(m::INGEST_DECODE_FAILURES_TOTAL).increment(1);
                warn!(error = %e, "failed to decode kernel event");
                return;
            }
        };

        let runtime = self.enrich(event);
        trace!(event = %runtime, "event enriched");

        for alert in self.engine.evaluate(&runtime) {
            self.publish(alert);
        }
    }

    /// 식별 정보, 캡처 시각, 목적지 문자열을 덧붙입니다.
    fn enrich(&self, event: Event) -> RuntimeEvent {
        RuntimeEvent {
            container: self.resolver.resolve_container(event.pid, event.cgroup_id),
            pod: self.resolver.resolve_pod(),
            timestamp: Utc::now(),
            addr: event.destination(),
            event,
        }
    }

    /// 알림을 로그로 남기고 수집 큐에 넣습니다 (가득 차면 버림).
    fn publish(&mut self, alert: Alert) {
        self.stats.alerts_raised += 1;
        metrics::counter!(
            m::INGEST_ALERTS_TOTAL,
            m::LABEL_RULE => alert.rule_id.clone(),
            m::LABEL_SEVERITY => alert.severity.as_str()
        )
        .increment(1);

        match alert.to_json() {
            Ok(json) => info!(rule = %alert.rule_id, alert = %json, "alert raised"),
            Err(e) => warn!(rule = %alert.rule_id, error = %e, "failed to serialize alert"),
        }

        let (alert, cause) = match self.alert_tx.try_send(alert) {
            Ok(()) => return,
            Err(TrySendError::Full(alert)) => (alert, "ingest queue full"),
            Err(TrySendError::Closed(alert)) => (alert, "ingest queue closed"),
        };

        self.stats.alerts_dropped += 1;
        metrics::counter!(m::INGEST_ALERTS_DROPPED_TOTAL).increment(1);
        warn!(
            rule = %alert.rule_id,
            reason = %alert.reason,
            cause,
            "dropping alert"
        );
    }
}
