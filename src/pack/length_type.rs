//! Current layout: big-endian length then message id.

use bytes::{BufMut, Bytes, BytesMut};

use super::{
    DataPack,
    HEADER_LEN,
    PackError,
    check_declared_len,
    checked_payload_len,
    header_bytes,
    max_frame_length,
};
use crate::{
    byte_order::{read_network_u32, write_network_u32},
    frame::{LengthField, LengthFormat},
    message::FrameHeader,
};

/// `| len: u32 BE | msg_id: u32 BE | data |`
#[derive(Clone, Copy, Debug)]
pub struct LengthTypePack {
    max_packet_size: u32,
}

impl LengthTypePack {
    /// Packer rejecting payloads above `max_packet_size` (`0` = unlimited).
    #[must_use]
    pub const fn new(max_packet_size: u32) -> Self { Self { max_packet_size } }
}

impl DataPack for LengthTypePack {
    fn pack(&self, msg_id: u32, data: &[u8]) -> Result<Bytes, PackError> {
        let len = checked_payload_len(data.len(), self.max_packet_size)?;
        let mut buf = BytesMut::with_capacity(HEADER_LEN + data.len());
        buf.put_slice(&write_network_u32(len));
        buf.put_slice(&write_network_u32(msg_id));
        buf.put_slice(data);
        Ok(buf.freeze())
    }

    fn unpack(&self, header: &[u8]) -> Result<FrameHeader, PackError> {
        let [l0, l1, l2, l3, i0, i1, i2, i3] = header_bytes(header)?;
        let data_len = read_network_u32([l0, l1, l2, l3]);
        check_declared_len(data_len, self.max_packet_size)?;
        Ok(FrameHeader {
            msg_id: read_network_u32([i0, i1, i2, i3]),
            data_len,
        })
    }

    // The declared length counts only the payload; the id word follows the
    // length field, hence the adjustment of four.
    fn length_field(&self) -> LengthField {
        LengthField::new(0, LengthFormat::u32_be(), max_frame_length(self.max_packet_size))
            .with_adjustment(4)
    }
}
