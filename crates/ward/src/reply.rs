//! Single-use reply channel back to one requester.
//!
//! A channel is bound to one request's correlation id and consumed by
//! [`ReplyChannel::send`], so a handler can reply at most once.

use futures::SinkExt;
use tokio::sync::oneshot;

use crate::bridge::protocol::{RequestId, Response};
use crate::bridge::transport::ResponseWriter;

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("reply for {got} sent on channel for {expected}")]
    Mismatch { expected: RequestId, got: RequestId },
    #[error("requester went away before the reply was delivered")]
    Closed,
    #[error("failed to write reply: {0}")]
    Io(#[from] std::io::Error),
}

enum Sink {
    /// The requester's own connection.
    Socket(ResponseWriter),
    /// An in-process caller awaiting a oneshot.
    Local(oneshot::Sender<Response>),
}

pub struct ReplyChannel {
    id: RequestId,
    sink: Sink,
}

impl ReplyChannel {
    pub fn socket(id: RequestId, writer: ResponseWriter) -> Self {
        Self {
            id,
            sink: Sink::Socket(writer),
        }
    }

    pub fn local(id: RequestId) -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id,
                sink: Sink::Local(tx),
            },
            rx,
        )
    }

    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Deliver the one response for this request and tear the channel down.
    pub async fn send(self, response: Response) -> Result<(), ReplyError> {
        if response.id != self.id {
            return Err(ReplyError::Mismatch {
                expected: self.id,
                got: response.id,
            });
        }

        match self.sink {
            Sink::Socket(mut writer) => {
                writer.send(response).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
                        ReplyError::Closed
                    }
                    _ => ReplyError::Io(e),
                })?;
                writer.close().await?;
            }
            Sink::Local(tx) => tx.send(response).map_err(|_| ReplyError::Closed)?,
        }
        tracing::trace!(request_id = %self.id, "Reply delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::net::UnixStream;

    use crate::bridge::transport::{client_halves, server_halves};

    #[tokio::test]
    async fn local_reply_reaches_receiver() {
        let id = RequestId::new();
        let (channel, rx) = ReplyChannel::local(id);
        assert_eq!(channel.request_id(), id);

        channel.send(Response::new(id, "Patient released")).await.unwrap();
        assert_eq!(rx.await.unwrap().message, "Patient released");
    }

    #[tokio::test]
    async fn local_reply_to_dropped_receiver_is_closed() {
        let id = RequestId::new();
        let (channel, rx) = ReplyChannel::local(id);
        drop(rx);

        let err = channel.send(Response::new(id, "x")).await.unwrap_err();
        assert!(matches!(err, ReplyError::Closed));
    }

    #[tokio::test]
    async fn mismatched_id_is_refused() {
        let id = RequestId::new();
        let (channel, _rx) = ReplyChannel::local(id);

        let err = channel
            .send(Response::new(RequestId::new(), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplyError::Mismatch { expected, .. } if expected == id));
    }

    #[tokio::test]
    async fn socket_reply_is_one_frame_then_eof() {
        let (server, client) = UnixStream::pair().unwrap();
        let (_requests, writer) = server_halves(server);
        let (mut responses, _writer) = client_halves(client);

        let id = RequestId::new();
        ReplyChannel::socket(id, writer)
            .send(Response::new(id, "No beds available"))
            .await
            .unwrap();

        let resp = responses.next().await.unwrap().unwrap();
        assert_eq!(resp.id, id);
        assert_eq!(resp.message, "No beds available");
        assert!(responses.next().await.is_none());
    }
}
