//! Errors raised while connecting a [`Client`](super::Client).

use std::io;

use thiserror::Error;

/// Failures establishing a client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connection could not be established.
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),
    /// The WebSocket connection or upgrade failed.
    #[error("websocket connect failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
