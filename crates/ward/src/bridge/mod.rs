//! IPC bridge between requesters and the ward server.
//!
//! - **protocol**: Message types (Request/Response envelopes, commands)
//! - **codec**: JSON framing codec for AsyncRead/AsyncWrite
//! - **transport**: Unix socket ingress and framed connection halves

pub mod codec;
pub mod protocol;
pub mod transport;
