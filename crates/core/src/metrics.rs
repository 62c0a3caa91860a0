//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `runsight_`
//! - 모듈명: `ingest_`, `bus_`, `gateway_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(runsight_core::metrics::INGEST_RECORDS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 탐지 규칙 레이블 키 (reverse_shell, process_injection, ...)
pub const LABEL_RULE: &str = "rule";

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

// ─── 수집 루프 메트릭 ──────────────────────────────────────────────

/// 수집: 읽은 원시 레코드 수 (counter)
pub const INGEST_RECORDS_TOTAL: &str = "runsight_ingest_records_total";

/// 수집: 커널이 보고한 유실 샘플 수 (counter)
pub const INGEST_LOST_SAMPLES_TOTAL: &str = "runsight_ingest_lost_samples_total";

/// 수집: 디코딩 실패 수 (counter)
pub const INGEST_DECODE_FAILURES_TOTAL: &str = "runsight_ingest_decode_failures_total";

/// 수집: 생성된 알림 수 (counter, label: rule, severity)
pub const INGEST_ALERTS_TOTAL: &str = "runsight_ingest_alerts_total";

/// 수집: 수집 큐 포화로 드롭된 알림 수 (counter)
pub const INGEST_ALERTS_DROPPED_TOTAL: &str = "runsight_ingest_alerts_dropped_total";

// ─── 알림 버스 메트릭 ──────────────────────────────────────────────

/// 버스: 구독자에게 전달된 알림 수 (counter)
pub const BUS_DELIVERED_TOTAL: &str = "runsight_bus_delivered_total";

/// 버스: 구독자 큐 포화로 드롭된 알림 수 (counter)
pub const BUS_SUBSCRIBER_DROPPED_TOTAL: &str = "runsight_bus_subscriber_dropped_total";

/// 버스: 현재 등록된 구독자 수 (gauge)
pub const BUS_ACTIVE_SUBSCRIBERS: &str = "runsight_bus_active_subscribers";

// ─── 게이트웨이 메트릭 ─────────────────────────────────────────────

/// 게이트웨이: 연결 한도 초과로 거부된 연결 수 (counter)
pub const GATEWAY_REJECTED_CONNECTIONS_TOTAL: &str =
    "runsight_gateway_rejected_connections_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `runsight-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Ingest
    describe_counter!(
        INGEST_RECORDS_TOTAL,
        "Total number of raw records read from the kernel event source"
    );
    describe_counter!(
        INGEST_LOST_SAMPLES_TOTAL,
        "Total number of samples the kernel reported as lost"
    );
    describe_counter!(
        INGEST_DECODE_FAILURES_TOTAL,
        "Total number of raw records that failed to decode"
    );
    describe_counter!(
        INGEST_ALERTS_TOTAL,
        "Total number of alerts raised by the detection rules"
    );
    describe_counter!(
        INGEST_ALERTS_DROPPED_TOTAL,
        "Total number of alerts dropped because the ingest queue was full"
    );

    // Bus
    describe_counter!(
        BUS_DELIVERED_TOTAL,
        "Total number of alerts enqueued to subscriber queues"
    );
    describe_counter!(
        BUS_SUBSCRIBER_DROPPED_TOTAL,
        "Total number of alerts dropped because a subscriber queue was full"
    );
    describe_gauge!(
        BUS_ACTIVE_SUBSCRIBERS,
        "Number of currently registered alert stream subscribers"
    );

    // Gateway
    describe_counter!(
        GATEWAY_REJECTED_CONNECTIONS_TOTAL,
        "Total number of connections rejected by the connection limit"
    );
}
