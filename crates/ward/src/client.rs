//! Requester side of the ingress channel.
//!
//! Each call opens its own connection, sends one request and waits for the
//! one response on that same connection.

use std::io;
use std::path::{Path, PathBuf};

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;

use crate::bridge::protocol::{Command, Request, RequestId, Requester, Response};
use crate::bridge::transport::client_halves;
use crate::patient::{NewPatient, PatientId};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach server at {}: {source}", path.display())]
    ChannelUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to send request: {0}")]
    Send(#[source] io::Error),
    #[error("failed to read response: {0}")]
    Receive(#[source] io::Error),
    #[error("server closed the channel without replying")]
    NoReply,
    #[error("response for {got} received for request {expected}")]
    Mismatch { expected: RequestId, got: RequestId },
}

#[derive(Debug, Clone)]
pub struct Client {
    socket_path: PathBuf,
    requester: Requester,
}

impl Client {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            requester: Requester::current(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.requester = self.requester.with_label(label);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn admit(&self, patient: NewPatient) -> Result<Response, ClientError> {
        self.send(Command::Admit { patient }).await
    }

    pub async fn release(&self, patient_id: PatientId) -> Result<Response, ClientError> {
        self.send(Command::Release { patient_id }).await
    }

    pub async fn search(&self, national_id: impl Into<String>) -> Result<Response, ClientError> {
        self.send(Command::Search {
            national_id: national_id.into(),
        })
        .await
    }

    /// Send one command and wait for its response. No retries.
    pub async fn send(&self, command: Command) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ClientError::ChannelUnavailable {
                path: self.socket_path.clone(),
                source,
            })?;
        let (mut reader, mut writer) = client_halves(stream);

        let request = Request::new(self.requester.clone(), command);
        let expected = request.id;
        tracing::debug!(request_id = %expected, command = request.command.kind(), "Sending request");
        writer.send(request).await.map_err(ClientError::Send)?;

        let response = reader
            .next()
            .await
            .ok_or(ClientError::NoReply)?
            .map_err(ClientError::Receive)?;

        if response.id != expected {
            return Err(ClientError::Mismatch {
                expected,
                got: response.id,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bridge::transport::{UnixIngress, server_halves};

    #[tokio::test]
    async fn missing_socket_is_channel_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new(dir.path().join("absent.sock"));

        let err = client.search("111").await.unwrap_err();
        assert!(matches!(err, ClientError::ChannelUnavailable { .. }));
    }

    #[tokio::test]
    async fn mismatched_reply_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ward.sock");
        let ingress = UnixIngress::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let stream = ingress.accept().await.unwrap();
            let (mut reader, mut writer) = server_halves(stream);
            let _request = reader.next().await.unwrap().unwrap();
            writer
                .send(Response::new(RequestId::new(), "Patient released"))
                .await
                .unwrap();
        });

        let err = Client::new(&path)
            .release(PatientId::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Mismatch { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn closed_channel_is_no_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ward.sock");
        let ingress = UnixIngress::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let stream = ingress.accept().await.unwrap();
            let (mut reader, _writer) = server_halves(stream);
            let _request = reader.next().await.unwrap().unwrap();
        });

        let err = Client::new(&path)
            .with_label("test")
            .search("111")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoReply));
        server.await.unwrap();
    }
}
