//! Requests handed to routers and interceptors.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    connection::{Connection, ConnectionId},
    message::Message,
};

/// One decoded message together with the connection it arrived on.
///
/// Cloning is cheap: the connection is shared and the payload is reference
/// counted.
#[derive(Clone, Debug)]
pub struct Request {
    conn: Arc<Connection>,
    message: Message,
}

impl Request {
    /// Pair `message` with the connection that received it.
    #[must_use]
    pub fn new(conn: Arc<Connection>, message: Message) -> Self { Self { conn, message } }

    /// Connection the message arrived on.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> { &self.conn }

    /// Id of the originating connection.
    #[must_use]
    pub fn conn_id(&self) -> ConnectionId { self.conn.id() }

    /// Decoded message.
    #[must_use]
    pub fn message(&self) -> &Message { &self.message }

    /// Message type id.
    #[must_use]
    pub fn msg_id(&self) -> u32 { self.message.msg_id() }

    /// Message payload.
    #[must_use]
    pub fn data(&self) -> &Bytes { self.message.data() }
}
