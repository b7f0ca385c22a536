//! Packet layouts: one message to and from one fixed-header frame.
//!
//! Two layouts are supported. [`LengthTypePack`] is the current format with a
//! big-endian `length | msg_id` header; [`TlvPack`] reads and writes the older
//! little-endian `msg_id | length` header still spoken by legacy peers. Both
//! use an eight byte header and describe their own [`LengthField`] so the
//! stream decoder can be configured from the packer alone.

mod length_type;
mod tlv;

use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

pub use self::{length_type::LengthTypePack, tlv::TlvPack};
use crate::{
    frame::LengthField,
    message::{FrameHeader, Message},
};

/// Header length shared by both layouts.
pub const HEADER_LEN: usize = 8;

/// Errors produced while packing or unpacking a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackError {
    /// The payload cannot be represented by the length field or exceeds the
    /// configured maximum.
    #[error("payload of {len} bytes exceeds the maximum of {max}")]
    PayloadTooLarge {
        /// Payload length.
        len: usize,
        /// Largest payload accepted.
        max: u64,
    },
    /// Fewer bytes than a header were supplied.
    #[error("short header: have {have} bytes, need {need}")]
    ShortHeader {
        /// Bytes supplied.
        have: usize,
        /// Header length.
        need: usize,
    },
    /// The header declares a payload larger than the configured maximum.
    #[error("declared payload of {len} bytes exceeds max packet size {max}")]
    TooLarge {
        /// Declared payload length.
        len: u32,
        /// Configured maximum.
        max: u32,
    },
    /// A frame's body does not match the length its header declares.
    #[error("frame carries {actual} payload bytes but declares {declared}")]
    LengthMismatch {
        /// Declared payload length.
        declared: u32,
        /// Bytes following the header.
        actual: usize,
    },
}

/// Encode and decode messages for one packet layout.
///
/// Implementations are pure and shared across every connection.
pub trait DataPack: Send + Sync + std::fmt::Debug {
    /// Fixed header length in bytes.
    fn header_len(&self) -> usize { HEADER_LEN }

    /// Encode `data` tagged with `msg_id` into one frame.
    ///
    /// # Errors
    /// Returns [`PackError::PayloadTooLarge`] if `data` does not fit the
    /// length field or exceeds the configured maximum.
    fn pack(&self, msg_id: u32, data: &[u8]) -> Result<Bytes, PackError>;

    /// Decode the header at the front of `header`.
    ///
    /// # Errors
    /// Returns [`PackError::ShortHeader`] when fewer than
    /// [`DataPack::header_len`] bytes are supplied and
    /// [`PackError::TooLarge`] when the declared length exceeds the maximum.
    fn unpack(&self, header: &[u8]) -> Result<FrameHeader, PackError>;

    /// Length field describing this layout to the stream decoder.
    fn length_field(&self) -> LengthField;

    /// Split a complete frame into a [`Message`].
    ///
    /// # Errors
    /// Propagates [`DataPack::unpack`] errors and returns
    /// [`PackError::LengthMismatch`] when the body length disagrees with the
    /// header.
    fn unpack_frame(&self, frame: Bytes) -> Result<Message, PackError> {
        let header = self.unpack(&frame)?;
        let body = frame.slice(self.header_len()..);
        if usize::try_from(header.data_len).ok() != Some(body.len()) {
            return Err(PackError::LengthMismatch {
                declared: header.data_len,
                actual: body.len(),
            });
        }
        Ok(Message::new(header.msg_id, body))
    }
}

/// Packet layout selected by configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PackKind {
    /// `| len u32 BE | msg_id u32 BE | data |`
    #[default]
    LengthType,
    /// `| msg_id u32 LE | len u32 LE | data |`
    Tlv,
}

impl PackKind {
    /// Build the packer for this layout. A `max_packet_size` of `0` disables
    /// the payload limit.
    #[must_use]
    pub fn build(self, max_packet_size: u32) -> Arc<dyn DataPack> {
        match self {
            Self::LengthType => Arc::new(LengthTypePack::new(max_packet_size)),
            Self::Tlv => Arc::new(TlvPack::new(max_packet_size)),
        }
    }
}

/// Shared payload checks for both layouts.
pub(crate) fn checked_payload_len(len: usize, max_packet_size: u32) -> Result<u32, PackError> {
    let limit = if max_packet_size == 0 {
        u32::MAX
    } else {
        max_packet_size
    };
    match u32::try_from(len) {
        Ok(declared) if declared <= limit => Ok(declared),
        _ => Err(PackError::PayloadTooLarge {
            len,
            max: u64::from(limit),
        }),
    }
}

pub(crate) fn check_declared_len(len: u32, max_packet_size: u32) -> Result<(), PackError> {
    if max_packet_size > 0 && len > max_packet_size {
        return Err(PackError::TooLarge {
            len,
            max: max_packet_size,
        });
    }
    Ok(())
}

pub(crate) fn header_bytes(header: &[u8]) -> Result<[u8; HEADER_LEN], PackError> {
    header
        .get(..HEADER_LEN)
        .and_then(|bytes| <[u8; HEADER_LEN]>::try_from(bytes).ok())
        .ok_or(PackError::ShortHeader {
            have: header.len(),
            need: HEADER_LEN,
        })
}

pub(crate) fn max_frame_length(max_packet_size: u32) -> usize {
    let max_payload = if max_packet_size == 0 {
        u32::MAX
    } else {
        max_packet_size
    };
    usize::try_from(max_payload)
        .unwrap_or(usize::MAX)
        .saturating_add(HEADER_LEN)
}
