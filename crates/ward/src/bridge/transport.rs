//! Unix-domain socket transport.
//!
//! The server binds one listening socket (the ingress channel). Each accepted
//! connection belongs to exactly one requester and carries one request frame
//! in and one response frame out, so the reply path exists before the request
//! is even written.

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::JsonCodec;
use super::protocol::{Request, Response};

/// Server-side read half of a requester connection.
pub type RequestReader = FramedRead<OwnedReadHalf, JsonCodec<Request>>;
/// Server-side write half of a requester connection.
pub type ResponseWriter = FramedWrite<OwnedWriteHalf, JsonCodec<Response>>;
/// Client-side halves.
pub type ResponseReader = FramedRead<OwnedReadHalf, JsonCodec<Response>>;
pub type RequestWriter = FramedWrite<OwnedWriteHalf, JsonCodec<Request>>;

/// Split an accepted connection into framed server halves.
pub fn server_halves(stream: UnixStream) -> (RequestReader, ResponseWriter) {
    let (read, write) = stream.into_split();
    (
        FramedRead::new(read, JsonCodec::new()),
        FramedWrite::new(write, JsonCodec::new()),
    )
}

/// Split a connected client stream into framed client halves.
pub fn client_halves(stream: UnixStream) -> (ResponseReader, RequestWriter) {
    let (read, write) = stream.into_split();
    (
        FramedRead::new(read, JsonCodec::new()),
        FramedWrite::new(write, JsonCodec::new()),
    )
}

/// Listening socket bound to a filesystem path.
///
/// A stale socket left behind by a previous process is removed on bind; the
/// socket file is removed again when the ingress is dropped.
pub struct UnixIngress {
    path: PathBuf,
    listener: UnixListener,
}

impl UnixIngress {
    pub fn bind(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            tracing::debug!(path = %path.display(), "Removing stale ingress socket");
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        tracing::debug!(path = %path.display(), "Bound ingress socket");

        Ok(Self { path, listener })
    }

    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        if self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Removing ingress socket");
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for UnixIngress {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(error = %e, "Failed to remove ingress socket");
        }
    }
}
