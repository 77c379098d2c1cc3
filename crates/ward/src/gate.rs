//! Admission gate: serializes intake of request frames.
//!
//! Holding the gate grants the right to read exactly one frame. Before the
//! frame is read, the caller's reservation (a handler queue slot) is taken
//! under the gate, so a full queue holds back every later admission. The gate
//! is released as soon as the frame has been read, before it is processed, so
//! it orders admission only. It is a different lock from the allocator's
//! state lock and never nests with it.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::bridge::protocol::Request;

/// Gate holds longer than this are logged.
pub const DEFAULT_SLOW_INTAKE: Duration = Duration::from_secs(5);

/// A request that made it through the gate.
#[derive(Debug)]
pub struct AdmittedFrame<R = ()> {
    /// Position in admission order, starting at 0.
    pub ticket: u64,
    pub request: Request,
    /// Whatever was reserved for the request while the gate was held.
    pub reservation: R,
}

#[derive(Debug)]
pub struct AdmissionGate {
    // tokio's mutex is fair: waiters acquire in the order they queued.
    lock: Mutex<()>,
    admitted: AtomicU64,
    slow_intake: Duration,
}

/// Exclusive right to read one frame. Dropping it releases the gate.
pub struct GateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            admitted: AtomicU64::new(0),
            slow_intake: DEFAULT_SLOW_INTAKE,
        }
    }

    /// Log gate holds that last longer than `threshold`.
    pub fn with_slow_intake(mut self, threshold: Duration) -> Self {
        self.slow_intake = threshold;
        self
    }

    pub async fn acquire(&self) -> GateGuard<'_> {
        tracing::trace!("Waiting for admission gate");
        let guard = self.lock.lock().await;
        tracing::trace!("Admission gate acquired");
        GateGuard { _guard: guard }
    }

    /// Reserve, then read one frame, both while holding the gate.
    ///
    /// `read` resolves to the next frame, `None` if the requester closed the
    /// channel without sending one, or an error for a broken or malformed
    /// frame. The gate is released in every case; the reservation is
    /// dropped unless a frame was admitted.
    pub async fn admit<R, Q, F>(
        &self,
        reserve: Q,
        read: F,
    ) -> io::Result<Option<AdmittedFrame<R>>>
    where
        Q: Future<Output = R>,
        F: Future<Output = Option<io::Result<Request>>>,
    {
        let guard = self.acquire().await;

        let started = Instant::now();
        let reservation = reserve.await;
        let waited = started.elapsed();
        if waited >= self.slow_intake {
            tracing::debug!(
                waited_ms = waited.as_millis() as u64,
                "Admission held back waiting for handler queue space"
            );
        }

        let frame = self.read_frame(read).await.transpose();
        // Tickets are drawn under the gate so they follow admission order.
        let ticket = match &frame {
            Ok(Some(_)) => self.admitted.fetch_add(1, Ordering::AcqRel),
            _ => 0,
        };
        drop(guard);
        tracing::trace!("Admission gate released");

        let Some(request) = frame? else {
            return Ok(None);
        };
        tracing::debug!(
            ticket,
            request_id = %request.id,
            pid = request.requester.pid,
            command = request.command.kind(),
            "Request admitted"
        );
        Ok(Some(AdmittedFrame {
            ticket,
            request,
            reservation,
        }))
    }

    async fn read_frame<F>(&self, read: F) -> F::Output
    where
        F: Future,
    {
        let mut read = std::pin::pin!(read);
        tokio::select! {
            frame = &mut read => frame,
            _ = tokio::time::sleep(self.slow_intake) => {
                tracing::debug!(
                    waited_ms = self.slow_intake.as_millis() as u64,
                    "Requester is holding the admission gate without sending a frame"
                );
                let frame = read.await;
                tracing::debug!("Slow requester finished its frame");
                frame
            }
        }
    }

    /// Number of frames admitted so far.
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Acquire)
    }

    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
