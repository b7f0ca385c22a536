//! Errors returned by connection send paths.

use std::io;

use thiserror::Error;

use crate::pack::PackError;

/// Failure to hand a frame to a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection is stopping or has finalized.
    #[error("connection closed")]
    Closed,
    /// The outbound queue stayed full for the whole enqueue timeout.
    #[error("send queue full")]
    QueueFull,
    /// The message could not be packed.
    #[error(transparent)]
    Pack(#[from] PackError),
    /// Writing to the transport failed; the connection has been stopped.
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}
