//! Dialing side of the connection engine.
//!
//! A [`Client`] connects to a server over TCP or WebSocket and drives the
//! resulting [`Connection`] with the same pumps, packers and routers a server
//! uses. Client connections carry [`ConnectionId::CLIENT`] and belong to no
//! manager. Inbound frames are dispatched to the client's own router, so a
//! client answers server pushes and heartbeats exactly as a server would.

mod error;

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{net::TcpStream, task::JoinHandle};

pub use self::error::ClientError;
use crate::{
    connection::{
        ByteSource,
        Connection,
        ConnectionAddrs,
        ConnectionConfig,
        ConnectionId,
        DEFAULT_IO_READ_BUFF_SIZE,
        DEFAULT_MAX_MSG_CHAN_LEN,
        DEFAULT_SEND_BUFF_TIMEOUT,
        FrameSink,
        transport::{split_stream, split_websocket},
    },
    dispatch::Dispatcher,
    heartbeat::HeartbeatChecker,
    hooks::{ConnectionHooks, connection_hook},
    pack::PackKind,
    router::Router,
};

/// Settings for one client connection.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Name reported by the connection.
    pub name: String,
    /// Packet layout; must match the server's.
    pub pack_kind: PackKind,
    /// Largest payload accepted or sent. `0` disables the limit.
    pub max_packet_size: u32,
    /// Read buffer size.
    pub io_read_buff_size: usize,
    /// Outbound queue depth for buffered sends.
    pub max_msg_chan_len: usize,
    /// How long a buffered send waits for queue space.
    pub send_buff_timeout: Duration,
    /// Dispatcher workers; `0` handles inbound frames on the read pump.
    pub worker_pool_size: usize,
    hooks: ConnectionHooks,
    heartbeat: Option<HeartbeatChecker>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: String::from("wirepump-client"),
            pack_kind: PackKind::LengthType,
            max_packet_size: 4096,
            io_read_buff_size: DEFAULT_IO_READ_BUFF_SIZE,
            max_msg_chan_len: DEFAULT_MAX_MSG_CHAN_LEN,
            send_buff_timeout: DEFAULT_SEND_BUFF_TIMEOUT,
            worker_pool_size: 0,
            hooks: ConnectionHooks::default(),
            heartbeat: None,
        }
    }
}

impl ClientConfig {
    /// Run `hook` once the connection is established.
    #[must_use]
    pub fn on_conn_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_start = Some(connection_hook(hook));
        self
    }

    /// Run `hook` once the connection stops.
    #[must_use]
    pub fn on_conn_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_stop = Some(connection_hook(hook));
        self
    }

    /// Probe the server with `checker`.
    #[must_use]
    pub fn with_heartbeat(mut self, checker: HeartbeatChecker) -> Self {
        self.heartbeat = Some(checker);
        self
    }
}

/// A connected client.
#[derive(Debug)]
pub struct Client {
    conn: Arc<Connection>,
    dispatcher: Arc<Dispatcher>,
    task: JoinHandle<()>,
}

impl Client {
    /// Dial `addr` over TCP and start serving the connection.
    ///
    /// # Errors
    /// Returns [`ClientError::Connect`] if the TCP connection fails.
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs,
        config: ClientConfig,
        router: Router,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let addrs = ConnectionAddrs {
            local: stream.local_addr().ok(),
            peer: stream.peer_addr().ok(),
        };
        let (source, sink) = split_stream(stream);
        Ok(Self::spawn(addrs, source, sink, config, router))
    }

    /// Open a WebSocket to `url` (for example `ws://127.0.0.1:9000`) and
    /// start serving the connection.
    ///
    /// # Errors
    /// Returns [`ClientError::WebSocket`] if the connection or upgrade fails.
    pub async fn connect_websocket(
        url: &str,
        config: ClientConfig,
        router: Router,
    ) -> Result<Self, ClientError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        let (source, sink) = split_websocket(socket);
        Ok(Self::spawn(
            ConnectionAddrs::default(),
            source,
            sink,
            config,
            router,
        ))
    }

    fn spawn(
        addrs: ConnectionAddrs,
        source: Box<dyn ByteSource>,
        sink: Box<dyn FrameSink>,
        config: ClientConfig,
        router: Router,
    ) -> Self {
        let dispatcher = Arc::new(
            Dispatcher::builder(Arc::new(router))
                .pool_size(config.worker_pool_size)
                .heartbeat_msg_id(config.heartbeat.as_ref().map(HeartbeatChecker::msg_id))
                .build(),
        );
        dispatcher.start();
        let mut conn_config = ConnectionConfig::new(
            config.pack_kind.build(config.max_packet_size),
            Arc::clone(&dispatcher),
        )
        .with_name(config.name.as_str())
        .with_hooks(config.hooks)
        .with_io_read_buff_size(config.io_read_buff_size)
        .with_max_msg_chan_len(config.max_msg_chan_len)
        .with_send_buff_timeout(config.send_buff_timeout);
        if let Some(checker) = config.heartbeat {
            conn_config = conn_config.with_heartbeat(checker);
        }
        let conn = Connection::new(ConnectionId::CLIENT, addrs, Arc::new(conn_config), sink);
        tracing::debug!(peer = ?addrs.peer, name = %config.name, "client connected");
        let task = tokio::spawn(Arc::clone(&conn).serve(source));
        Self {
            conn,
            dispatcher,
            task,
        }
    }

    /// The client's connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> { &self.conn }

    /// Stop the connection and wait for it to finalize.
    pub async fn close(self) {
        self.conn.stop();
        if let Err(err) = self.task.await {
            tracing::debug!(error = %err, "client connection task failed");
        }
        self.dispatcher.stop().await;
    }
}
