//! 알림 팬아웃 버스
//!
//! [`AlertBus`]는 구독자별 bounded 큐를 하나의 뮤텍스 아래에서 관리합니다.
//! 등록, 해제, 브로드캐스트가 모두 같은 락을 잡기 때문에 해제 직후의
//! 브로드캐스트가 이미 닫힌 큐에 쓰는 일은 없습니다.
//!
//! ```text
//! IngestionLoop ──▶ ingest queue (1024) ──▶ run_broadcaster ──▶ AlertBus
//!                                                                │ try_send
//!                                            ┌───────────────────┼──────────────┐
//!                                            ▼                   ▼              ▼
//!                                      subscriber (32)     subscriber (32)     ...
//! ```
//!
//! 모든 전달은 non-blocking입니다. 가득 찬 구독자 큐는 그 구독자에 대해서만
//! 알림을 버리고 로그를 남깁니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use runsight_core::metrics as m;
use runsight_core::types::Alert;

type Registry = HashMap<Uuid, mpsc::Sender<Arc<Alert>>>;

/// 구독자 레지스트리 + 팬아웃
///
/// 복제 비용이 낮은 핸들입니다. 모든 복제본은 같은 레지스트리를 공유합니다.
#[derive(Clone)]
pub struct AlertBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    subscribers: Mutex<Registry>,
    capacity: usize,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl AlertBus {
    /// 구독자 큐 용량을 지정하여 버스를 생성합니다.
    pub fn new(subscriber_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                capacity: subscriber_capacity.max(1),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// 새 구독자를 등록합니다.
    ///
    /// 반환된 핸들이 drop되면 자동으로 해제됩니다.
    pub fn register(&self) -> SubscriberHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        metrics::gauge!(m::BUS_ACTIVE_SUBSCRIBERS).set(count as f64);
        debug!(subscriber = %id, active = count, "subscriber registered");

        SubscriberHandle {
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// 구독자를 해제하고 큐를 닫습니다.
    ///
    /// 이미 해제된 구독자면 아무 일도 하지 않고 `false`를 반환합니다.
    /// 큐에 남아 있던 알림은 읽을 수 있으며, 그 뒤 수신 측은 스트림 종료를 봅니다.
    pub fn release(&self, id: Uuid) -> bool {
        let (removed, count) = {
            let mut subscribers = self.lock();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            metrics::gauge!(m::BUS_ACTIVE_SUBSCRIBERS).set(count as f64);
            debug!(subscriber = %id, active = count, "subscriber released");
        }
        removed
    }

    /// 등록된 모든 구독자에게 알림을 전달합니다 (non-blocking).
    ///
    /// 실제로 큐에 들어간 구독자 수를 반환합니다.
    pub fn broadcast(&self, alert: Arc<Alert>) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0usize;
        let mut closed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(Arc::clone(&alert)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::BUS_SUBSCRIBER_DROPPED_TOTAL, m::LABEL_RULE => alert.rule_id.clone())
                        .increment(1);
                    warn!(
                        subscriber = %id,
                        rule = %alert.rule_id,
                        reason = %alert.reason,
                        "subscriber queue full, dropping alert"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        // 수신 측이 해제 없이 사라진 경우
        for id in closed {
            subscribers.remove(&id);
            debug!(subscriber = %id, "removed closed subscriber");
        }
        let count = subscribers.len();
        drop(subscribers);

        metrics::gauge!(m::BUS_ACTIVE_SUBSCRIBERS).set(count as f64);
        if delivered > 0 {
            self.inner
                .delivered
                .fetch_add(delivered as u64, Ordering::Relaxed);
            metrics::counter!(m::BUS_DELIVERED_TOTAL).increment(delivered as u64);
        }
        delivered
    }

    /// 현재 등록된 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// 누적 전달 건수 (구독자 단위)
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// 큐가 가득 차서 버린 누적 건수 (구독자 단위)
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// 모든 구독자를 해제합니다. 각 스트림은 남은 알림을 읽은 뒤 종료됩니다.
    pub fn close_all(&self) {
        let closed = {
            let mut subscribers = self.lock();
            let closed = subscribers.len();
            subscribers.clear();
            closed
        };
        metrics::gauge!(m::BUS_ACTIVE_SUBSCRIBERS).set(0.0);
        if closed > 0 {
            info!(closed, "all subscribers closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for AlertBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertBus")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// 등록된 구독자의 수신 측
///
/// drop 시 버스에서 자동 해제됩니다.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: Uuid,
    rx: mpsc::Receiver<Arc<Alert>>,
    bus: AlertBus,
}

impl SubscriberHandle {
    /// 구독자 ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 다음 알림을 기다립니다. 해제 후 큐가 비면 `None`을 반환합니다.
    pub async fn recv(&mut self) -> Option<Arc<Alert>> {
        self.rx.recv().await
    }

    /// 대기 없이 알림을 꺼냅니다.
    pub fn try_recv(&mut self) -> Option<Arc<Alert>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.bus.release(self.id);
    }
}

/// 수집 큐를 비우며 버스로 팬아웃합니다.
///
/// 수집 큐의 모든 송신 측이 닫히면 남은 알림을 전달한 뒤 모든 구독자를 닫고
/// 반환합니다. 전달한 알림 수를 반환합니다.
pub async fn run_broadcaster(bus: AlertBus, mut rx: mpsc::Receiver<Alert>) -> u64 {
    info!("alert broadcaster started");
    let mut forwarded = 0u64;

    while let Some(alert) = rx.recv().await {
        bus.broadcast(Arc::new(alert));
        forwarded += 1;
    }

    bus.close_all();
    info!(forwarded, "alert broadcaster stopped");
    forwarded
}
