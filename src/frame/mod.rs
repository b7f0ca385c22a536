//! Length-field framing for byte streams.

pub mod conversion;
pub mod decoder;
pub mod error;
pub mod format;

pub use conversion::bytes_to_u64;
pub use decoder::{FrameDecoder, LengthField};
pub use error::FramingError;
pub use format::{Endianness, LengthFormat};

#[cfg(test)]
mod tests;
