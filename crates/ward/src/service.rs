//! BedService: transport-agnostic owner of the allocation table.
//!
//! This service owns:
//! - The [`BedAllocator`] and its state lock
//! - The [`AdmissionGate`] every request passes through
//! - The [`RequestDispatcher`] and its handler pool
//! - Shutdown coordination
//!
//! Socket connections and in-process callers take the same path: gate (with
//! a handler queue slot reserved under it), then dispatcher, then a
//! single-use reply.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::allocator::BedAllocator;
use crate::audit::AuditSink;
use crate::bridge::protocol::{Request, Response};
use crate::bridge::transport::server_halves;
use crate::config::{ConfigError, ServiceConfig};
use crate::dispatcher::RequestDispatcher;
use crate::gate::AdmissionGate;
use crate::permit::{HandlerPool, SaturationPolicy};
use crate::reply::ReplyChannel;
use crate::table::Occupancy;
use crate::version::VersionInfo;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("handler finished without replying")]
    NoReply,
}

/// Snapshot of service health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub instance: String,
    pub version: VersionInfo,
    pub occupancy: Occupancy,
    pub available_handlers: usize,
    pub total_handlers: usize,
    pub queue_depth: usize,
    pub when_saturated: SaturationPolicy,
    /// Admitted requests that are running or queued for a handler.
    pub in_flight: usize,
    pub admitted_frames: u64,
    pub shutting_down: bool,
}

impl HealthSnapshot {
    /// Every handler busy.
    pub fn is_busy(&self) -> bool {
        self.available_handlers == 0
    }
}

pub struct BedService {
    config: ServiceConfig,
    allocator: Arc<BedAllocator>,
    gate: AdmissionGate,
    dispatcher: RequestDispatcher,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    version: VersionInfo,
}

impl BedService {
    pub fn new(config: ServiceConfig, audit: Arc<dyn AuditSink>) -> Result<Self, ConfigError> {
        config.validate()?;

        let allocator = Arc::new(BedAllocator::new(config.limits, audit));
        let pool = Arc::new(HandlerPool::new(
            config.workers,
            config.queue_depth,
            config.when_saturated,
        ));
        let dispatcher = RequestDispatcher::new(Arc::clone(&allocator), pool);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            instance = %config.instance,
            regular_beds = config.limits.regular_beds,
            emergency_beds = config.limits.emergency_beds,
            max_patients = config.limits.max_patients,
            workers = config.workers,
            queue_depth = config.queue_depth,
            when_saturated = %config.when_saturated,
            "Allocation table initialized"
        );

        Ok(Self {
            config,
            allocator,
            gate: AdmissionGate::new(),
            dispatcher,
            shutdown_tx,
            shutdown_rx,
            version: VersionInfo::new(),
        })
    }

    /// Take one request from an accepted connection and hand it off.
    ///
    /// Under the `wait` policy a full handler queue stalls this connection
    /// inside the gate, holding back every later admission until a slot
    /// frees. Returns the handler task, or `None` when the connection produced
    /// no request (closed early or sent a broken frame). Failures here affect
    /// only this connection.
    pub async fn serve_connection(&self, stream: UnixStream) -> Option<JoinHandle<()>> {
        let (mut reader, writer) = server_halves(stream);

        let admitted = match self
            .gate
            .admit(self.dispatcher.reserve(), reader.next())
            .await
        {
            Ok(Some(admitted)) => admitted,
            Ok(None) => {
                tracing::debug!("Requester closed the channel before sending a request");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read request frame");
                return None;
            }
        };

        let reply = ReplyChannel::socket(admitted.request.id, writer);
        Some(
            self.dispatcher
                .dispatch(admitted.request, admitted.reservation, reply),
        )
    }

    /// Run an in-process request through the gate and dispatcher.
    pub async fn submit(&self, request: Request) -> Result<Response, ServiceError> {
        let admitted = self
            .gate
            .admit(self.dispatcher.reserve(), async { Some(Ok(request)) })
            .await
            .ok()
            .flatten()
            .ok_or(ServiceError::NoReply)?;

        let (reply, rx) = ReplyChannel::local(admitted.request.id);
        let handle = self
            .dispatcher
            .dispatch(admitted.request, admitted.reservation, reply);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Request handler task failed");
        }
        rx.await.map_err(|_| ServiceError::NoReply)
    }

    pub fn health(&self) -> HealthSnapshot {
        let pool = self.dispatcher.pool();
        HealthSnapshot {
            instance: self.config.instance.clone(),
            version: self.version,
            occupancy: self.allocator.occupancy(),
            available_handlers: pool.available(),
            total_handlers: pool.num_workers(),
            queue_depth: pool.queue_depth(),
            when_saturated: pool.policy(),
            in_flight: pool.in_flight(),
            admitted_frames: self.gate.admitted(),
            shutting_down: *self.shutdown_rx.borrow(),
        }
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Wait for in-flight requests to finish, up to `timeout`.
    ///
    /// Returns `true` if nothing was left running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let pool = Arc::clone(self.dispatcher.pool());
        let wait = async {
            while pool.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(in_flight = pool.in_flight(), "Drain timed out with requests still running");
                false
            }
        }
    }
}
