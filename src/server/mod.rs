//! Tokio-based server for length-prefixed binary protocols.
//!
//! A [`Server`] owns a [`ServerConfig`], a [`Router`] and the optional
//! connection hooks, heartbeat template and interceptors configured through
//! its builder methods. [`Server::start`] binds the configured transport and
//! accepts connections until [`Server::stop`] is called; every accepted
//! socket becomes a [`Connection`](crate::connection::Connection) registered
//! with the server's [`ConnectionManager`].

mod error;
mod runtime;
mod tls;
mod websocket;

use std::{
    future::Future,
    net::SocketAddr,
    sync::{Arc, Mutex, OnceLock, atomic::AtomicBool},
    time::Duration,
};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub use self::{error::ServerError, runtime::BackoffConfig, websocket::WebSocketAuth};
use crate::{
    config::{ServerConfig, ServerMode},
    connection::Connection,
    frame::LengthField,
    heartbeat::HeartbeatChecker,
    hooks::{ConnectionHooks, connection_hook},
    manager::ConnectionManager,
    middleware::Interceptor,
    pack::DataPack,
    router::Router,
};

/// Handshake request passed to a [`WebSocketAuth`] callback.
pub use tokio_tungstenite::tungstenite::handshake::server::Request as UpgradeRequest;

/// Connection server.
///
/// Builder methods consume and return the server; once configured, share it
/// behind an [`Arc`] so [`Server::stop`] can be called while
/// [`Server::start`] runs.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use wirepump::{config::ServerConfig, router::HandlerRouter, server::Server};
///
/// # async fn run() -> Result<(), wirepump::server::ServerError> {
/// let router = HandlerRouter::new().build();
/// let server = Arc::new(Server::new(ServerConfig::default(), router)?);
/// server.run_with_shutdown(async {
///     let _ = tokio::signal::ctrl_c().await;
/// })
/// .await
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    hooks: ConnectionHooks,
    heartbeat: Option<HeartbeatChecker>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    packer: Option<Arc<dyn DataPack>>,
    length_field: Option<LengthField>,
    ws_auth: Option<WebSocketAuth>,
    backoff: BackoffConfig,
    ready_tx: Mutex<Option<oneshot::Sender<()>>>,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
    started: AtomicBool,
    endpoint: OnceLock<SocketAddr>,
}

impl Server {
    /// Create a server from validated settings and a router built in the
    /// configured mode.
    ///
    /// # Errors
    /// Returns [`ServerError::Config`] if `config` fails validation and
    /// [`ServerError::RouterModeMismatch`] if `router` was built in a
    /// different mode than `config.router_mode`.
    pub fn new(config: ServerConfig, router: Router) -> Result<Self, ServerError> {
        config.validate()?;
        if router.mode() != config.router_mode {
            return Err(ServerError::RouterModeMismatch {
                expected: config.router_mode,
                found: router.mode(),
            });
        }
        Ok(Self {
            config,
            router: Arc::new(router),
            hooks: ConnectionHooks::default(),
            heartbeat: None,
            interceptors: Vec::new(),
            packer: None,
            length_field: None,
            ws_auth: None,
            backoff: BackoffConfig::default(),
            ready_tx: Mutex::new(None),
            manager: Arc::new(ConnectionManager::new()),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            endpoint: OnceLock::new(),
        })
    }

    /// Run `hook` after each connection is accepted, before its first
    /// frame is read.
    #[must_use]
    pub fn on_conn_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_start = Some(connection_hook(hook));
        self
    }

    /// Run `hook` once when a connection stops, before its transport
    /// closes.
    #[must_use]
    pub fn on_conn_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_stop = Some(connection_hook(hook));
        self
    }

    /// Give every connection a clone of `checker`. Unrouted frames carrying
    /// the checker's message id are absorbed quietly.
    #[must_use]
    pub fn with_heartbeat(mut self, checker: HeartbeatChecker) -> Self {
        self.heartbeat = Some(checker);
        self
    }

    /// Probe every `interval` with the default heartbeat message, treating
    /// peers silent for the configured `heartbeat_max` as dead.
    #[must_use]
    pub fn with_default_heartbeat(self, interval: Duration) -> Self {
        let checker = HeartbeatChecker::new(interval, self.config.heartbeat_max);
        self.with_heartbeat(checker)
    }

    /// Append an interceptor around request dispatch.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Frame messages with `packer` instead of the configured
    /// [`PackKind`](crate::pack::PackKind). Inbound frames are decoded with
    /// the packer's [`DataPack::length_field`] unless
    /// [`Server::with_length_field`] overrides it.
    #[must_use]
    pub fn with_packer(mut self, packer: Arc<dyn DataPack>) -> Self {
        self.packer = Some(packer);
        self
    }

    /// Decode inbound frames with `field`.
    #[must_use]
    pub fn with_length_field(mut self, field: LengthField) -> Self {
        self.length_field = Some(field);
        self
    }

    /// Authenticate WebSocket upgrade requests. Rejected requests receive
    /// `401 Unauthorized`.
    #[must_use]
    pub fn with_websocket_auth<F>(mut self, auth: F) -> Self
    where
        F: Fn(&UpgradeRequest) -> bool + Send + Sync + 'static,
    {
        self.ws_auth = Some(Arc::new(auth));
        self
    }

    /// Override the accept loop back-off.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Notify `tx` once the listener is bound.
    #[must_use]
    pub fn ready_signal(self, tx: oneshot::Sender<()>) -> Self {
        if let Ok(mut slot) = self.ready_tx.lock() {
            *slot = Some(tx);
        }
        self
    }

    /// Settings the server was built with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    /// Registry of live connections.
    #[must_use]
    pub fn manager(&self) -> &Arc<ConnectionManager> { &self.manager }

    /// Bound address; `None` until [`Server::start`] has bound the listener.
    #[must_use]
    pub fn endpoint(&self) -> Option<SocketAddr> { self.endpoint.get().copied() }

    /// Bound address as `tcp://host:port` or `ws://host:port`.
    #[must_use]
    pub fn endpoint_url(&self) -> Option<String> {
        let scheme = match self.config.mode {
            ServerMode::Tcp => "tcp",
            ServerMode::WebSocket => "ws",
        };
        self.endpoint().map(|addr| format!("{scheme}://{addr}"))
    }

    /// Stop accepting and close every connection. Safe to call more than
    /// once, and before or during [`Server::start`].
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            log::info!("server stopping: name={}", self.config.name);
        }
        self.shutdown.cancel();
    }

    /// `true` once [`Server::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.shutdown.is_cancelled() }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.name)
            .field("mode", &self.config.mode)
            .field("endpoint", &self.endpoint())
            .field("connections", &self.manager.len())
            .finish_non_exhaustive()
    }
}
