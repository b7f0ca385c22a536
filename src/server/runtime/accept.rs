//! Accept loop: admission control, transport handshakes and connection
//! spawning.

use std::{
    io,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep, timeout},
};
use tokio_rustls::TlsAcceptor;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    config::DEFAULT_HANDSHAKE_TIMEOUT,
    connection::{
        ByteSource,
        Connection,
        ConnectionAddrs,
        ConnectionConfig,
        ConnectionId,
        transport::{TransportHalves, split_stream, split_websocket},
    },
    manager::ConnectionManager,
    panic::format_panic,
    server::websocket::{self, WebSocketAuth},
};

/// Source of incoming TCP connections.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// How an accepted socket becomes connection halves.
pub(in crate::server) enum Transport {
    Tcp,
    Tls(TlsAcceptor),
    WebSocket(Option<WebSocketAuth>),
}

/// State shared by the accept loop and the handshake tasks it spawns.
pub(in crate::server) struct AcceptContext {
    pub transport: Transport,
    pub conn_config: Arc<ConnectionConfig>,
    pub manager: Arc<ConnectionManager>,
    pub max_conn: usize,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
    handshake_timeout: Duration,
    next_id: AtomicU64,
    handshaking: AtomicUsize,
}

impl AcceptContext {
    pub(in crate::server) fn new(
        transport: Transport,
        conn_config: Arc<ConnectionConfig>,
        manager: Arc<ConnectionManager>,
        max_conn: usize,
        shutdown: CancellationToken,
        tracker: TaskTracker,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            transport,
            conn_config,
            manager,
            max_conn,
            shutdown,
            tracker,
            backoff: backoff.normalized(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            next_id: AtomicU64::new(1),
            handshaking: AtomicUsize::new(0),
        }
    }

    /// Drop sockets whose TLS or WebSocket handshake takes longer than
    /// `limit`.
    #[must_use]
    pub(in crate::server) fn with_handshake_timeout(mut self, limit: Duration) -> Self {
        self.handshake_timeout = limit;
        self
    }

    /// Registered connections plus those still completing a handshake.
    fn occupancy(&self) -> usize {
        self.manager.len() + self.handshaking.load(Ordering::Acquire)
    }

    fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Accept connections until `ctx.shutdown` is cancelled.
///
/// While the server holds `max_conn` connections the loop stops accepting and
/// waits with exponential back-off; pending sockets stay in the kernel
/// backlog until a slot frees. Accept errors back off the same way. Each
/// admitted socket gets the next connection id, is registered with the
/// manager and is served on its own task tracked by `ctx.tracker`.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, ctx: Arc<AcceptContext>)
where
    L: AcceptListener + 'static,
{
    let mut delay = ctx.backoff.initial_delay;
    while let Some(next_delay) = accept_iteration(&listener, &ctx, delay).await {
        delay = next_delay;
    }
    debug!("accept loop stopped");
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L>(
    listener: &Arc<L>,
    ctx: &Arc<AcceptContext>,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener + 'static,
{
    if ctx.occupancy() >= ctx.max_conn {
        debug!(
            "connection limit reached: live={}, max_conn={}, retry_in={delay:?}",
            ctx.manager.len(),
            ctx.max_conn
        );
        select! {
            biased;

            () = ctx.shutdown.cancelled() => return None,
            () = sleep(delay) => {}
        }
        return Some(ctx.backoff.next_delay(delay));
    }

    select! {
        biased;

        () = ctx.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer)) => {
                admit(ctx, stream, peer);
                ctx.backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                select! {
                    biased;

                    () = ctx.shutdown.cancelled() => return None,
                    () = sleep(delay) => {}
                }
                ctx.backoff.next_delay(delay)
            }
        }),
    }
}

fn admit(ctx: &Arc<AcceptContext>, stream: TcpStream, peer: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY: error={e}, peer_addr={peer}");
    }
    let addrs = ConnectionAddrs {
        local: stream.local_addr().ok(),
        peer: Some(peer),
    };
    match &ctx.transport {
        Transport::Tcp => register(ctx, addrs, split_stream(stream)),
        Transport::Tls(_) | Transport::WebSocket(_) => {
            let guard = HandshakeGuard::new(Arc::clone(ctx));
            ctx.tracker.spawn(handshake(guard, stream, addrs));
        }
    }
}

async fn handshake(guard: HandshakeGuard, stream: TcpStream, addrs: ConnectionAddrs) {
    let ctx = Arc::clone(&guard.ctx);
    let upgraded = async {
        match &ctx.transport {
            Transport::Tcp => Ok(split_stream(stream)),
            Transport::Tls(acceptor) => acceptor.accept(stream).await.map(split_stream),
            Transport::WebSocket(auth) => websocket::upgrade(stream, auth.clone())
                .await
                .map(split_websocket)
                .map_err(io::Error::other),
        }
    };
    let halves = select! {
        biased;

        () = ctx.shutdown.cancelled() => return,
        res = timeout(ctx.handshake_timeout, upgraded) => res,
    };
    match halves {
        Ok(Ok(halves)) => {
            register(&ctx, addrs, halves);
            drop(guard);
        }
        Ok(Err(e)) => warn!("handshake failed: error={e}, peer_addr={:?}", addrs.peer),
        Err(_) => warn!(
            "handshake timed out: limit={:?}, peer_addr={:?}",
            ctx.handshake_timeout, addrs.peer
        ),
    }
}

/// Register a connection and serve it on its own task.
///
/// A connection registered after shutdown began may have missed the
/// manager's final sweep, so it is stopped straight away.
pub(super) fn register(
    ctx: &AcceptContext,
    addrs: ConnectionAddrs,
    (source, sink): TransportHalves,
) {
    let conn = Connection::new(ctx.next_id(), addrs, Arc::clone(&ctx.conn_config), sink);
    ctx.manager.add(Arc::clone(&conn));
    if ctx.shutdown.is_cancelled() {
        debug!("connection registered during shutdown: conn_id={}", conn.id());
        conn.stop();
    }
    tracing::info!(conn_id = %conn.id(), peer = ?addrs.peer, "connection accepted");
    spawn_connection(&ctx.tracker, conn, source);
}

/// Serve `conn` on its own task, logging and discarding any panic.
fn spawn_connection(tracker: &TaskTracker, conn: Arc<Connection>, source: Box<dyn ByteSource>) {
    let peer_addr = conn.peer_addr();
    let conn_id = conn.id();
    tracker.spawn(async move {
        if let Err(panic) = AssertUnwindSafe(conn.serve(source)).catch_unwind().await {
            let panic_msg = format_panic(&*panic);
            error!("connection task panicked: panic={panic_msg}, conn_id={conn_id}, peer_addr={peer_addr:?}");
            tracing::error!(%conn_id, panic = %panic_msg, ?peer_addr, "connection task panicked");
        }
    });
}

/// Counts a socket against `max_conn` while its handshake runs.
struct HandshakeGuard {
    ctx: Arc<AcceptContext>,
}

impl HandshakeGuard {
    fn new(ctx: Arc<AcceptContext>) -> Self {
        ctx.handshaking.fetch_add(1, Ordering::AcqRel);
        Self { ctx }
    }
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) { self.ctx.handshaking.fetch_sub(1, Ordering::AcqRel); }
}
