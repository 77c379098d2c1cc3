//! Bounded pool of request-handler permits.
//!
//! A handler may only run while it holds a [`HandlerPermit`]. Getting one is
//! two steps: a [`QueueSlot`] is reserved first, then traded for a worker.
//! There are `workers + queue_depth` slots, so at most `workers` requests run
//! and at most `queue_depth` more wait. What happens to a request arriving
//! when every slot is taken is decided by the pool's [`SaturationPolicy`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc};

/// Identifies one handler permit, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// What to do with a request when every handler is busy and the wait queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// Wait for queue space. Intake stalls until then.
    #[default]
    Wait,
    /// Refuse immediately; the requester is told the server is busy.
    Reject,
}

impl fmt::Display for SaturationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wait => "wait",
            Self::Reject => "reject",
        })
    }
}

impl FromStr for SaturationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wait" => Ok(Self::Wait),
            "reject" => Ok(Self::Reject),
            other => Err(format!("invalid saturation policy '{other}', expected 'wait' or 'reject'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PermitError {
    #[error("handler queue is full")]
    Saturated,
    #[error("handler pool is closed")]
    Closed,
}

struct PoolConnection {
    pool_tx: mpsc::Sender<WorkerId>,
    pool_available: Arc<AtomicUsize>,
}

/// A reserved place in the pool: running or queued for a worker.
///
/// Counts toward [`HandlerPool::in_flight`] from the moment it is reserved.
#[derive(Debug)]
pub struct QueueSlot {
    slot: OwnedSemaphorePermit,
}

/// Permission to run one request handler. Returns to the pool on drop.
pub struct HandlerPermit {
    worker: WorkerId,
    pool: PoolConnection,
    _queue_slot: OwnedSemaphorePermit,
}

impl HandlerPermit {
    pub fn worker(&self) -> WorkerId {
        self.worker
    }
}

impl Drop for HandlerPermit {
    fn drop(&mut self) {
        if self.pool.pool_tx.try_send(self.worker).is_ok() {
            self.pool.pool_available.fetch_add(1, Ordering::Release);
        } else {
            tracing::error!(worker = %self.worker, "Failed to return handler permit to pool");
        }
    }
}

pub struct HandlerPool {
    available_rx: Mutex<mpsc::Receiver<WorkerId>>,
    available_tx: mpsc::Sender<WorkerId>,
    num_workers: usize,
    available_count: Arc<AtomicUsize>,
    /// Admission into the pool: `num_workers + queue_depth` slots.
    queue: Arc<Semaphore>,
    queue_depth: usize,
    policy: SaturationPolicy,
}

impl HandlerPool {
    pub fn new(num_workers: usize, queue_depth: usize, policy: SaturationPolicy) -> Self {
        let (tx, rx) = mpsc::channel(num_workers.max(1));
        for n in 0..num_workers {
            if tx.try_send(WorkerId(n)).is_err() {
                tracing::error!(worker = n, "Failed to seed handler permit");
            }
        }

        Self {
            available_rx: Mutex::new(rx),
            available_tx: tx,
            num_workers,
            available_count: Arc::new(AtomicUsize::new(num_workers)),
            queue: Arc::new(Semaphore::new(num_workers + queue_depth)),
            queue_depth,
            policy,
        }
    }

    /// Reserve a queue slot, honoring the saturation policy when all are taken.
    pub async fn reserve(&self) -> Result<QueueSlot, PermitError> {
        let slot = match self.policy {
            SaturationPolicy::Wait => Arc::clone(&self.queue)
                .acquire_owned()
                .await
                .map_err(|_| PermitError::Closed)?,
            SaturationPolicy::Reject => Arc::clone(&self.queue)
                .try_acquire_owned()
                .map_err(|_| PermitError::Saturated)?,
        };
        Ok(QueueSlot { slot })
    }

    /// Wait for an idle worker for an already reserved slot.
    pub async fn acquire_with(&self, slot: QueueSlot) -> Result<HandlerPermit, PermitError> {
        let mut rx = self.available_rx.lock().await;
        let worker = rx.recv().await.ok_or(PermitError::Closed)?;
        self.available_count.fetch_sub(1, Ordering::Release);
        Ok(self.permit(worker, slot.slot))
    }

    /// Reserve a slot and wait for a worker.
    pub async fn acquire(&self) -> Result<HandlerPermit, PermitError> {
        let slot = self.reserve().await?;
        self.acquire_with(slot).await
    }

    /// Obtain a permit only if a handler is idle right now.
    pub fn try_acquire(&self) -> Option<HandlerPermit> {
        let queue_slot = Arc::clone(&self.queue).try_acquire_owned().ok()?;
        let mut rx = self.available_rx.try_lock().ok()?;
        let worker = rx.try_recv().ok()?;
        self.available_count.fetch_sub(1, Ordering::Release);
        Some(self.permit(worker, queue_slot))
    }

    fn permit(&self, worker: WorkerId, queue_slot: OwnedSemaphorePermit) -> HandlerPermit {
        HandlerPermit {
            worker,
            pool: PoolConnection {
                pool_tx: self.available_tx.clone(),
                pool_available: Arc::clone(&self.available_count),
            },
            _queue_slot: queue_slot,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn policy(&self) -> SaturationPolicy {
        self.policy
    }

    /// Idle handler permits.
    pub fn available(&self) -> usize {
        self.available_count.load(Ordering::Acquire)
    }

    /// Requests holding a permit or a queue slot.
    pub fn in_flight(&self) -> usize {
        self.num_workers + self.queue_depth - self.queue.available_permits()
    }
}
