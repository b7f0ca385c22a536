//! Errors raised by [`Server`](super::Server) operations.

use std::io;

use thiserror::Error;

use crate::{config::ConfigError, router::RouterMode};

/// Errors that may occur while building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
    /// A TLS certificate or key file could not be read.
    #[error("failed to read TLS file `{path}`: {source}")]
    Tls {
        /// File that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The private key file held no usable key.
    #[error("no private key found in `{0}`")]
    MissingPrivateKey(String),
    /// rustls rejected the certificate and key pair.
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(#[from] tokio_rustls::rustls::Error),
    /// The router was built in a different mode than configured.
    #[error("router built in {found} mode but configuration expects {expected}")]
    RouterModeMismatch {
        /// Mode named in configuration.
        expected: RouterMode,
        /// Mode of the supplied router.
        found: RouterMode,
    },
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// [`Server::start`](super::Server::start) was called twice.
    #[error("server already started")]
    AlreadyStarted,
}
