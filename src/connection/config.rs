//! Immutable settings shared by every connection of one server or client.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use crate::{
    dispatch::Dispatcher,
    frame::LengthField,
    heartbeat::HeartbeatChecker,
    hooks::ConnectionHooks,
    manager::ConnectionManager,
    pack::DataPack,
};

/// Default bytes read from a transport per call.
pub const DEFAULT_IO_READ_BUFF_SIZE: usize = 1024;
/// Default depth of the outbound queue used by buffered sends.
pub const DEFAULT_MAX_MSG_CHAN_LEN: usize = 1024;
/// Default time a buffered send waits for queue space.
pub const DEFAULT_SEND_BUFF_TIMEOUT: Duration = Duration::from_millis(5);

/// Settings fixed when a server or client is constructed.
///
/// A connection holds an `Arc` to this value; nothing in it changes while
/// connections are live.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub(crate) name: Arc<str>,
    pub(crate) packer: Arc<dyn DataPack>,
    pub(crate) length_field: LengthField,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) manager: Option<Weak<ConnectionManager>>,
    pub(crate) hooks: ConnectionHooks,
    pub(crate) heartbeat: Option<HeartbeatChecker>,
    pub(crate) io_read_buff_size: usize,
    pub(crate) max_msg_chan_len: usize,
    pub(crate) send_buff_timeout: Duration,
}

impl ConnectionConfig {
    /// Settings for connections framed by `packer` and dispatched to
    /// `dispatcher`, with default buffer sizes and no hooks.
    #[must_use]
    pub fn new(packer: Arc<dyn DataPack>, dispatcher: Arc<Dispatcher>) -> Self {
        let length_field = packer.length_field();
        Self {
            name: Arc::from("wirepump"),
            packer,
            length_field,
            dispatcher,
            manager: None,
            hooks: ConnectionHooks::default(),
            heartbeat: None,
            io_read_buff_size: DEFAULT_IO_READ_BUFF_SIZE,
            max_msg_chan_len: DEFAULT_MAX_MSG_CHAN_LEN,
            send_buff_timeout: DEFAULT_SEND_BUFF_TIMEOUT,
        }
    }

    /// Name reported by [`Connection::name`](super::Connection::name).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Register connections in `manager` and deregister them on finalize.
    #[must_use]
    pub fn with_manager(mut self, manager: &Arc<ConnectionManager>) -> Self {
        self.manager = Some(Arc::downgrade(manager));
        self
    }

    /// Decode inbound frames with `field` instead of the packer's own
    /// [`DataPack::length_field`].
    #[must_use]
    pub fn with_length_field(mut self, field: LengthField) -> Self {
        self.length_field = field;
        self
    }

    /// Install lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: ConnectionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Bind a clone of `checker` to every connection when it starts.
    #[must_use]
    pub fn with_heartbeat(mut self, checker: HeartbeatChecker) -> Self {
        self.heartbeat = Some(checker);
        self
    }

    /// Bytes read per transport call. Clamped to at least one.
    #[must_use]
    pub fn with_io_read_buff_size(mut self, size: usize) -> Self {
        self.io_read_buff_size = size.max(1);
        self
    }

    /// Outbound queue depth for buffered sends. Clamped to at least one.
    #[must_use]
    pub fn with_max_msg_chan_len(mut self, len: usize) -> Self {
        self.max_msg_chan_len = len.max(1);
        self
    }

    /// How long a buffered send waits for queue space.
    #[must_use]
    pub fn with_send_buff_timeout(mut self, timeout: Duration) -> Self {
        self.send_buff_timeout = timeout;
        self
    }

    /// Packer shared by every connection.
    #[must_use]
    pub fn packer(&self) -> &Arc<dyn DataPack> { &self.packer }

    /// Length field inbound frames are decoded with.
    #[must_use]
    pub fn length_field(&self) -> LengthField { self.length_field }

    pub(crate) fn manager(&self) -> Option<Arc<ConnectionManager>> {
        self.manager.as_ref().and_then(Weak::upgrade)
    }
}
