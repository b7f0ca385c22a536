//! Conversion helpers for reading length fields.

use super::{error::FramingError, format::Endianness};

/// Converts a byte slice into a `u64` according to `size` and `endianness`.
///
/// Only field sizes of `1`, `2`, `4`, or `8` bytes are supported. `bytes` must
/// contain at least `size` bytes.
///
/// # Errors
/// Returns [`FramingError::UnsupportedWidth`] if `size` is unsupported or
/// [`FramingError::IncompleteHeader`] if `bytes` is too short.
pub fn bytes_to_u64(bytes: &[u8], size: usize, endianness: Endianness) -> Result<u64, FramingError> {
    if !matches!(size, 1 | 2 | 4 | 8) {
        return Err(FramingError::UnsupportedWidth(size));
    }
    if bytes.len() < size {
        return Err(FramingError::IncompleteHeader {
            have: bytes.len(),
            need: size,
        });
    }

    let mut buf = [0u8; 8];
    match endianness {
        Endianness::Big => {
            buf[8 - size..].copy_from_slice(&bytes[..size]);
            #[expect(
                clippy::big_endian_bytes,
                reason = "Big-endian length fields are read in network order."
            )]
            Ok(u64::from_be_bytes(buf))
        }
        Endianness::Little => {
            buf[..size].copy_from_slice(&bytes[..size]);
            #[expect(
                clippy::little_endian_bytes,
                reason = "Little-endian length fields are read as declared."
            )]
            Ok(u64::from_le_bytes(buf))
        }
    }
}
