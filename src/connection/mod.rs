//! One live peer: transport halves, pumps, send paths and session state.
//!
//! A [`Connection`] is created by the accept loop (or a client) around the two
//! halves of a transport. [`Connection::serve`] runs the on-start hook, binds
//! the heartbeat, spawns the read pump and then waits for the connection's
//! cancellation token. Whatever stops the connection (an explicit
//! [`Connection::stop`], end of stream, an I/O error, a protocol violation, a
//! failed heartbeat) ends in a single finalization: the on-stop hook runs,
//! the send paths close, the heartbeat stops, the transport shuts down and the
//! connection leaves its manager.
//!
//! Send-path state, the property bag and the activity timestamp live behind
//! separate locks so that no operation on one waits for another.

mod config;
mod counter;
mod error;
mod id;
mod properties;
mod pump;
mod send;
pub mod transport;

#[cfg(test)]
mod tests;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use self::{
    config::{
        ConnectionConfig,
        DEFAULT_IO_READ_BUFF_SIZE,
        DEFAULT_MAX_MSG_CHAN_LEN,
        DEFAULT_SEND_BUFF_TIMEOUT,
    },
    counter::live_connection_count,
    error::ConnectionError,
    id::ConnectionId,
    transport::{ByteSource, FrameSink},
};
use self::{counter::LiveSlot, properties::PropertyBag, send::SendGate};
use crate::heartbeat::HeartbeatHandle;

/// Local and peer addresses of a transport, when it has them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionAddrs {
    /// Address the connection was accepted on.
    pub local: Option<SocketAddr>,
    /// Remote address.
    pub peer: Option<SocketAddr>,
}

/// A live connection to one peer.
pub struct Connection {
    id: ConnectionId,
    addrs: ConnectionAddrs,
    config: Arc<ConnectionConfig>,
    lifetime: CancellationToken,
    gate: Mutex<SendGate>,
    sink: tokio::sync::Mutex<Option<Box<dyn FrameSink>>>,
    properties: PropertyBag,
    last_activity: Mutex<Instant>,
    finalized: AtomicBool,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
    slot: Mutex<Option<LiveSlot>>,
}

impl Connection {
    /// Create a connection that writes through `sink`.
    ///
    /// The connection does nothing until [`Connection::serve`] is called with
    /// the matching read half.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        addrs: ConnectionAddrs,
        config: Arc<ConnectionConfig>,
        sink: Box<dyn FrameSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            addrs,
            config,
            lifetime: CancellationToken::new(),
            gate: Mutex::new(SendGate::default()),
            sink: tokio::sync::Mutex::new(Some(sink)),
            properties: PropertyBag::default(),
            last_activity: Mutex::new(Instant::now()),
            finalized: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
            slot: Mutex::new(Some(LiveSlot::acquire(id))),
        })
    }

    /// Identifier assigned at accept time.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Server or client name from the connection settings.
    #[must_use]
    pub fn name(&self) -> &str { &self.config.name }

    /// Remote address, if the transport has one.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.addrs.peer }

    /// Local address, if the transport has one.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.addrs.local }

    /// Settings shared with the connection's siblings.
    #[must_use]
    pub fn config(&self) -> &Arc<ConnectionConfig> { &self.config }

    /// Token cancelled when this connection stops.
    ///
    /// The returned token is a child: cancelling it does not stop the
    /// connection, use [`Connection::stop`] for that.
    #[must_use]
    pub fn context(&self) -> CancellationToken { self.lifetime.child_token() }

    /// Request shutdown. Idempotent; finalization runs on the serving task.
    pub fn stop(&self) {
        if !self.lifetime.is_cancelled() {
            tracing::debug!(conn_id = %self.id, "connection stop requested");
        }
        self.lifetime.cancel();
    }

    /// `true` once [`Connection::stop`] has been requested.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.lifetime.is_cancelled() }

    /// Record inbound activity now.
    pub fn touch(&self) { *lock(&self.last_activity) = Instant::now(); }

    /// Time of the most recent inbound activity.
    #[must_use]
    pub fn last_activity(&self) -> Instant { *lock(&self.last_activity) }

    /// `true` while the connection is open and has been silent for no longer
    /// than `max_silence`.
    #[must_use]
    pub fn is_alive(&self, max_silence: Duration) -> bool {
        !self.is_closed() && self.last_activity().elapsed() <= max_silence
    }

    /// Attach `value` under `key`, replacing any previous value.
    pub fn set_property<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.properties.set(key, value);
    }

    /// Read back a property stored as `T`.
    #[must_use]
    pub fn get_property<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.properties.get(key)
    }

    /// Remove a property, returning whether it was present.
    pub fn remove_property(&self, key: &str) -> bool { self.properties.remove(key) }

    /// Bind a running heartbeat to this connection, replacing (and stopping)
    /// any previous one. A heartbeat bound after finalization is stopped
    /// immediately.
    pub fn set_heartbeat(&self, handle: HeartbeatHandle) {
        if self.finalized.load(Ordering::Acquire) {
            handle.stop();
            return;
        }
        if let Some(previous) = lock(&self.heartbeat).replace(handle) {
            previous.stop();
        }
    }

    /// Pack `data` with the connection's packer.
    ///
    /// # Errors
    /// Returns [`ConnectionError::Pack`] if the payload is too large.
    pub fn pack(&self, msg_id: u32, data: &[u8]) -> Result<Bytes, ConnectionError> {
        Ok(self.config.packer.pack(msg_id, data)?)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.addrs.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
