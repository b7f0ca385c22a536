//! Errors raised while carving frames out of a byte stream.

use std::io;

use thiserror::Error;

/// Wire-level problems detected before any payload interpretation.
///
/// Every variant is a protocol violation: the connection that produced it is
/// closed and the decoder's retained bytes are discarded.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The computed frame length exceeds the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Frame length implied by the length field.
        size: u64,
        /// Maximum allowed frame length.
        max: usize,
    },

    /// The length field, once adjusted, describes an impossible frame.
    #[error("invalid frame length encoding")]
    InvalidLengthEncoding,

    /// Fewer bytes than the length field occupies were supplied.
    #[error("incomplete length field: have {have}, need {need}")]
    IncompleteHeader {
        /// Bytes currently available.
        have: usize,
        /// Bytes required to read the length field.
        need: usize,
    },

    /// Length fields must be 1, 2, 4, or 8 bytes wide.
    #[error("unsupported length field width: {0}")]
    UnsupportedWidth(usize),
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self { io::Error::new(io::ErrorKind::InvalidData, err) }
}
