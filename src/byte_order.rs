//! Explicit byte-order conversions for packet headers.
//!
//! The current packet layout writes header words in network order while the
//! legacy layout writes them little-endian. Keeping both conversions here
//! scopes the Clippy expectations to the points where endianness is chosen.

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use wirepump::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use wirepump::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0x12, 0x34, 0x56, 0x78]), 0x1234_5678);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}

/// Serialise a `u32` little-endian, as the legacy TLV header does.
///
/// ```
/// use wirepump::byte_order::write_legacy_u32;
///
/// assert_eq!(write_legacy_u32(0x1234_5678), [0x78, 0x56, 0x34, 0x12]);
/// ```
#[must_use]
pub fn write_legacy_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The legacy TLV header is little-endian on the wire."
    )]
    value.to_le_bytes()
}

/// Parse a little-endian `u32` written by a legacy TLV peer.
#[must_use]
pub fn read_legacy_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The legacy TLV header is little-endian on the wire."
    )]
    u32::from_le_bytes(bytes)
}
