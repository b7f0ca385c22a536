//! Stateful reassembly of frames from arbitrarily chunked input.
//!
//! A [`LengthField`] describes where the length lives inside a frame and how
//! to turn the declared value into a total frame size:
//!
//! ```text
//! frame_len = offset + width + adjustment + declared
//! ```
//!
//! [`FrameDecoder`] retains partial input between calls so that a frame split
//! across reads, or several frames coalesced into one read, decode to the same
//! sequence of frames.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::{error::FramingError, format::LengthFormat};

/// Location and interpretation of a frame's length field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthField {
    /// Bytes preceding the length field.
    pub offset: usize,
    /// Width and byte order of the field.
    pub format: LengthFormat,
    /// Signed correction added to the declared length.
    pub adjustment: i64,
    /// Bytes removed from the front of every emitted frame.
    pub initial_bytes_to_strip: usize,
    /// Largest accepted frame, header included.
    pub max_frame_length: usize,
}

impl LengthField {
    /// Field at `offset` with no adjustment or stripping.
    #[must_use]
    pub const fn new(offset: usize, format: LengthFormat, max_frame_length: usize) -> Self {
        Self {
            offset,
            format,
            adjustment: 0,
            initial_bytes_to_strip: 0,
            max_frame_length,
        }
    }

    /// Set the length adjustment.
    #[must_use]
    pub const fn with_adjustment(mut self, adjustment: i64) -> Self {
        self.adjustment = adjustment;
        self
    }

    /// Strip `bytes` from the front of each emitted frame.
    #[must_use]
    pub const fn with_strip(mut self, bytes: usize) -> Self {
        self.initial_bytes_to_strip = bytes;
        self
    }

    /// Bytes needed before the length can be read.
    #[must_use]
    pub const fn field_end(&self) -> usize { self.offset + self.format.width() }

    fn frame_length(&self, declared: u64) -> Result<usize, FramingError> {
        let field_end =
            i128::try_from(self.field_end()).map_err(|_| FramingError::InvalidLengthEncoding)?;
        let total = i128::from(declared) + i128::from(self.adjustment) + field_end;
        if total < field_end {
            return Err(FramingError::InvalidLengthEncoding);
        }
        let max = i128::try_from(self.max_frame_length).unwrap_or(i128::MAX);
        if total > max {
            return Err(FramingError::OversizedFrame {
                size: u64::try_from(total).unwrap_or(u64::MAX),
                max: self.max_frame_length,
            });
        }
        usize::try_from(total).map_err(|_| FramingError::InvalidLengthEncoding)
    }

    /// Split the next complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` when more input is required. On error `src` is
    /// left untouched; callers decide whether to discard it.
    fn split_frame(&self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        let field_end = self.field_end();
        if src.len() < field_end {
            return Ok(None);
        }
        let declared = self.format.read_len(&src[self.offset..field_end])?;
        let frame_len = self.frame_length(declared)?;
        if self.initial_bytes_to_strip > frame_len {
            return Err(FramingError::InvalidLengthEncoding);
        }
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(frame_len);
        frame.advance(self.initial_bytes_to_strip);
        Ok(Some(frame.freeze()))
    }
}

/// Per-connection frame reassembler.
#[derive(Debug)]
pub struct FrameDecoder {
    field: LengthField,
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a decoder for `field` with an empty buffer.
    #[must_use]
    pub fn new(field: LengthField) -> Self {
        Self {
            field,
            buffer: BytesMut::new(),
        }
    }

    /// Length field this decoder applies.
    #[must_use]
    pub const fn field(&self) -> &LengthField { &self.field }

    /// Number of bytes retained from previous chunks.
    #[must_use]
    pub fn buffered(&self) -> usize { self.buffer.len() }

    /// Append `chunk` and return every frame it completes, in receipt order.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] when the stream violates the length field.
    /// The retained bytes are discarded so the decoder can be dropped or
    /// reused without replaying the bad input.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            match self.field.split_frame(&mut self.buffer) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                Err(err) => {
                    self.buffer.clear();
                    return Err(err);
                }
            }
        }
    }
}

impl Decoder for FrameDecoder {
    type Item = Bytes;
    type Error = std::io::Error;

    /// Decode directly from the codec's buffer; the internal buffer used by
    /// [`FrameDecoder::decode`] is not involved.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.field.split_frame(src) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                src.clear();
                Err(err.into())
            }
        }
    }
}
