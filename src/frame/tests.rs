//! Unit tests for length field conversion and frame reassembly.

use bytes::BytesMut;
use rstest::rstest;
use tokio_util::codec::Decoder;

use super::*;

#[rstest]
#[case(vec![0x12], 1, Endianness::Big, 0x12)]
#[case(vec![0x12, 0x34], 2, Endianness::Big, 0x1234)]
#[case(vec![0x34, 0x12], 2, Endianness::Little, 0x1234)]
#[case(vec![0, 0, 0, 1], 4, Endianness::Big, 1)]
#[case(vec![1, 0, 0, 0], 4, Endianness::Little, 1)]
#[case(vec![0, 0, 0, 0, 0, 0, 0, 1], 8, Endianness::Big, 1)]
#[case(vec![0xFF, 0xFF, 0xFF, 0xFF], 4, Endianness::Big, 0xFFFF_FFFF)]
fn bytes_to_u64_ok(
    #[case] bytes: Vec<u8>,
    #[case] size: usize,
    #[case] endianness: Endianness,
    #[case] expected: u64,
) {
    assert_eq!(
        bytes_to_u64(&bytes, size, endianness).expect("failed to convert"),
        expected
    );
}

#[rstest]
fn bytes_to_u64_short() {
    let err = bytes_to_u64(&[0x01], 2, Endianness::Big).unwrap_err();
    assert_eq!(err, FramingError::IncompleteHeader { have: 1, need: 2 });
}

#[rstest]
fn bytes_to_u64_unsupported() {
    let err = bytes_to_u64(&[1, 2, 3], 3, Endianness::Little).unwrap_err();
    assert_eq!(err, FramingError::UnsupportedWidth(3));
}

#[test]
fn try_new_rejects_odd_widths() {
    assert!(LengthFormat::try_new(3, Endianness::Big).is_err());
    assert_eq!(
        LengthFormat::try_new(4, Endianness::Little).expect("valid width"),
        LengthFormat::u32_le()
    );
}

/// `| len u32 BE | id u32 BE | data |` where `len` counts only the data.
fn length_type_field() -> LengthField {
    LengthField::new(0, LengthFormat::u32_be(), 1024).with_adjustment(4)
}

fn length_type_frame(id: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&u32::try_from(data.len()).expect("short payload").to_be_bytes());
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(data);
    out
}

#[test]
fn partial_header_is_retained() {
    let mut decoder = FrameDecoder::new(length_type_field());
    let frame = length_type_frame(1, b"hi");
    assert!(decoder.decode(&frame[..3]).expect("decode").is_empty());
    assert_eq!(decoder.buffered(), 3);
    let frames = decoder.decode(&frame[3..]).expect("decode");
    assert_eq!(frames, vec![bytes::Bytes::from(frame)]);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn coalesced_frames_decode_in_order() {
    let mut decoder = FrameDecoder::new(length_type_field());
    let mut input = length_type_frame(1, b"one");
    input.extend(length_type_frame(2, b""));
    input.extend(length_type_frame(3, b"three"));
    let frames = decoder.decode(&input).expect("decode");
    assert_eq!(frames.len(), 3);
    assert_eq!(&frames[0][8..], b"one");
    assert_eq!(frames[1].len(), 8);
    assert_eq!(&frames[2][8..], b"three");
}

#[test]
fn oversized_frame_discards_retained_bytes() {
    let field = LengthField::new(0, LengthFormat::u32_be(), 16).with_adjustment(4);
    let mut decoder = FrameDecoder::new(field);
    let err = decoder
        .decode(&length_type_frame(1, &[0u8; 9]))
        .expect_err("frame of 17 bytes must be rejected");
    assert_eq!(err, FramingError::OversizedFrame { size: 17, max: 16 });
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn negative_adjustment_below_header_is_invalid() {
    let field = LengthField::new(0, LengthFormat::u32_be(), 64).with_adjustment(-8);
    let mut decoder = FrameDecoder::new(field);
    let err = decoder.decode(&[0, 0, 0, 2]).expect_err("length underflows");
    assert_eq!(err, FramingError::InvalidLengthEncoding);
}

#[test]
fn strip_removes_leading_bytes() {
    let field = length_type_field().with_strip(8);
    let mut decoder = FrameDecoder::new(field);
    let frames = decoder.decode(&length_type_frame(7, b"body")).expect("decode");
    assert_eq!(frames, vec![bytes::Bytes::from_static(b"body")]);
}

#[test]
fn length_field_after_offset() {
    // | id u32 LE | len u32 LE | data |
    let field = LengthField::new(4, LengthFormat::u32_le(), 64);
    let mut decoder = FrameDecoder::new(field);
    let mut frame = 9u32.to_le_bytes().to_vec();
    frame.extend_from_slice(&3u32.to_le_bytes());
    frame.extend_from_slice(b"abc");
    frame.extend_from_slice(b"tail");
    let frames = decoder.decode(&frame).expect("decode");
    assert_eq!(frames.len(), 1);
    assert_eq!(&frames[0][8..], b"abc");
    assert_eq!(decoder.buffered(), 4);
}

#[test]
fn codec_decoder_reads_from_source_buffer() {
    let mut decoder = FrameDecoder::new(length_type_field());
    let mut src = BytesMut::from(&length_type_frame(5, b"xyz")[..]);
    let frame = Decoder::decode(&mut decoder, &mut src)
        .expect("decode")
        .expect("complete frame");
    assert_eq!(&frame[8..], b"xyz");
    assert!(src.is_empty());
}

#[test]
fn codec_decoder_maps_violations_to_invalid_data() {
    let field = LengthField::new(0, LengthFormat::u32_be(), 8).with_adjustment(4);
    let mut decoder = FrameDecoder::new(field);
    let mut src = BytesMut::from(&length_type_frame(5, b"too long")[..]);
    let err = Decoder::decode(&mut decoder, &mut src).expect_err("oversized");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert!(src.is_empty());
}
