//! Length field width and byte order.

use super::{conversion::bytes_to_u64, error::FramingError};

/// Byte order used for decoding length fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

/// Width and byte order of a frame's length field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthFormat {
    bytes: usize,
    endianness: Endianness,
}

impl LengthFormat {
    /// Creates a `LengthFormat` with the given width and endianness.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not one of `1`, `2`, `4`, or `8`.
    #[must_use]
    pub const fn new(bytes: usize, endianness: Endianness) -> Self {
        assert!(
            matches!(bytes, 1 | 2 | 4 | 8),
            "invalid length field width"
        );
        Self { bytes, endianness }
    }

    /// Fallible constructor validating the field width.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::UnsupportedWidth`] if `bytes` is not one of
    /// `1`, `2`, `4`, or `8`.
    pub fn try_new(bytes: usize, endianness: Endianness) -> Result<Self, FramingError> {
        if !matches!(bytes, 1 | 2 | 4 | 8) {
            return Err(FramingError::UnsupportedWidth(bytes));
        }
        Ok(Self { bytes, endianness })
    }

    /// Four byte big-endian field.
    #[must_use]
    pub const fn u32_be() -> Self { Self::new(4, Endianness::Big) }

    /// Four byte little-endian field.
    #[must_use]
    pub const fn u32_le() -> Self { Self::new(4, Endianness::Little) }

    /// Number of bytes the field occupies.
    #[must_use]
    pub const fn width(&self) -> usize { self.bytes }

    /// Byte order of the field.
    #[must_use]
    pub const fn endianness(&self) -> Endianness { self.endianness }

    /// Read the declared length from the start of `bytes`.
    ///
    /// # Errors
    /// Returns an error if `bytes` is shorter than the field.
    pub fn read_len(&self, bytes: &[u8]) -> Result<u64, FramingError> {
        bytes_to_u64(bytes, self.bytes, self.endianness)
    }
}

impl Default for LengthFormat {
    fn default() -> Self { Self::u32_be() }
}
