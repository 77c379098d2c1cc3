//! Request dispatcher: one handler task per admitted request.
//!
//! Each request arrives with the queue slot reserved for it at admission.
//! Its handler trades that slot for a [`HandlerPermit`], executes the
//! command against the [`BedAllocator`], writes the single response line
//! through the request's [`ReplyChannel`] and ends. Handlers race for the
//! state lock; nothing orders them beyond that.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::allocator::BedAllocator;
use crate::bridge::protocol::{Command, Request, Response, lines};
use crate::permit::{HandlerPool, PermitError, QueueSlot};
use crate::reply::ReplyChannel;

pub struct RequestDispatcher {
    allocator: Arc<BedAllocator>,
    pool: Arc<HandlerPool>,
}

impl RequestDispatcher {
    pub fn new(allocator: Arc<BedAllocator>, pool: Arc<HandlerPool>) -> Self {
        Self { allocator, pool }
    }

    pub fn pool(&self) -> &Arc<HandlerPool> {
        &self.pool
    }

    /// Reserve a queue slot for the next request, per the pool's policy.
    pub async fn reserve(&self) -> Result<QueueSlot, PermitError> {
        self.pool.reserve().await
    }

    /// Hand an admitted request to a handler task.
    ///
    /// Requests that are refused (no queue slot, unsupported protocol
    /// version) are answered from a short task without touching the
    /// allocator.
    pub fn dispatch(
        &self,
        request: Request,
        slot: Result<QueueSlot, PermitError>,
        reply: ReplyChannel,
    ) -> JoinHandle<()> {
        let slot = match slot {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "Handler pool saturated, rejecting request");
                return tokio::spawn(deliver(reply, Response::new(request.id, lines::SERVER_BUSY)));
            }
        };

        if !request.is_supported() {
            tracing::warn!(
                request_id = %request.id,
                version = request.version,
                "Rejecting request with unsupported protocol version"
            );
            return tokio::spawn(async move {
                deliver(reply, Response::new(request.id, lines::UNSUPPORTED_VERSION)).await;
                drop(slot);
            });
        }

        let allocator = Arc::clone(&self.allocator);
        let pool = Arc::clone(&self.pool);
        tokio::spawn(handle(allocator, pool, slot, request, reply))
    }
}

async fn handle(
    allocator: Arc<BedAllocator>,
    pool: Arc<HandlerPool>,
    slot: QueueSlot,
    request: Request,
    reply: ReplyChannel,
) {
    let permit = match pool.acquire_with(slot).await {
        Ok(permit) => permit,
        Err(e) => {
            tracing::warn!(request_id = %request.id, error = %e, "No handler available, rejecting request");
            deliver(reply, Response::new(request.id, lines::SERVER_BUSY)).await;
            return;
        }
    };

    let worker = permit.worker();
    let command = request.command.kind();
    tracing::debug!(%worker, request_id = %request.id, command, "Handling request");

    let message = execute(&allocator, request.command);
    deliver(reply, Response::new(request.id, message)).await;

    // The permit is held until the reply is written.
    drop(permit);
}

/// Run one command against the allocator and render its response line.
pub fn execute(allocator: &BedAllocator, command: Command) -> String {
    match command {
        Command::Admit { patient } => match allocator.admit(patient) {
            Ok(admitted) => admitted.to_string(),
            Err(e) => e.to_string(),
        },
        Command::Release { patient_id } => match allocator.release(patient_id) {
            Ok(_) => lines::RELEASED.to_string(),
            Err(e) => e.to_string(),
        },
        Command::Search { national_id } => match allocator.find_by_national_id(&national_id) {
            Ok(summary) => summary.to_string(),
            Err(e) => e.to_string(),
        },
        Command::Unknown => lines::UNKNOWN_COMMAND.to_string(),
    }
}

async fn deliver(reply: ReplyChannel, response: Response) {
    let request_id = reply.request_id();
    if let Err(e) = reply.send(response).await {
        tracing::warn!(%request_id, error = %e, "Failed to deliver reply");
    }
}
