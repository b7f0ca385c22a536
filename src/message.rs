//! Decoded protocol messages.

use bytes::Bytes;

/// Message type id and payload carried by one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    msg_id: u32,
    data: Bytes,
}

impl Message {
    /// Create a message from its id and payload.
    #[must_use]
    pub fn new(msg_id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            msg_id,
            data: data.into(),
        }
    }

    /// Message type id used for routing.
    #[must_use]
    pub const fn msg_id(&self) -> u32 { self.msg_id }

    /// Payload bytes.
    #[must_use]
    pub const fn data(&self) -> &Bytes { &self.data }

    /// Payload length in bytes.
    #[must_use]
    pub fn data_len(&self) -> usize { self.data.len() }

    /// Consume the message, returning the payload.
    #[must_use]
    pub fn into_data(self) -> Bytes { self.data }
}

/// Header fields decoded from the front of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message type id.
    pub msg_id: u32,
    /// Declared payload length.
    pub data_len: u32,
}
