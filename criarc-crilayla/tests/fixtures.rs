//! Decoding tests against hand-assembled CRILAYLA frames
//!
//! Frames are built by emitting tokens MSB-first through a forward `BitCodec`
//! and byte-reversing the result, which yields the backward stream the
//! decoder reads.

use criarc_core::CriArcError;
use criarc_core::bitstream::{BitCodec, BitWrite};
use criarc_crilayla::{CrilaylaFrame, TAIL_SIZE, decompress, decompress_frame};

/// Token writer for test frames.
struct FrameBuilder {
    bits: BitCodec,
}

impl FrameBuilder {
    fn new() -> Self {
        Self {
            bits: BitCodec::new(),
        }
    }

    fn literal(mut self, byte: u8) -> Self {
        self.bits.write_bit(false).unwrap();
        self.bits.write_u8(byte, 8).unwrap();
        self
    }

    /// Back-reference with raw length fields (widths 2, 3, 5, 8, 8, ...).
    fn backref(mut self, distance: u16, fields: &[u8]) -> Self {
        self.bits.write_bit(true).unwrap();
        self.bits.write_u16(distance, 13).unwrap();
        for (i, &value) in fields.iter().enumerate() {
            let width = [2, 3, 5, 8].get(i).copied().unwrap_or(8);
            self.bits.write_u8(value, width).unwrap();
        }
        self
    }

    fn finish(mut self, raw_size: u32, tail: &[u8]) -> Vec<u8> {
        let mut stream = self.bits.take_buffer();
        stream.reverse();

        let mut frame = b"CRILAYLA".to_vec();
        frame.extend_from_slice(&raw_size.to_le_bytes());
        frame.extend_from_slice(&(stream.len() as u32).to_le_bytes());
        frame.extend_from_slice(&stream);
        frame.extend_from_slice(tail);
        frame
    }
}

fn pattern_tail() -> Vec<u8> {
    (0..TAIL_SIZE).map(|i| (i * 7 + 3) as u8).collect()
}

#[test]
fn test_overlapping_backref() {
    let tail = pattern_tail();
    let frame = FrameBuilder::new()
        .literal(b'Q')
        .literal(b'Z')
        .literal(b'Y')
        .literal(b'X')
        .backref(0, &[3, 0])
        .finish(10, &tail);

    let out = decompress(&frame, 10 + 0x100).unwrap();
    assert_eq!(&out[..10], b"XYZXYZXYZQ");
    assert_eq!(&out[out.len() - TAIL_SIZE..], &tail[..]);
}

#[test]
fn test_backref_into_tail() {
    let tail = pattern_tail();
    let frame = FrameBuilder::new().backref(0, &[1]).finish(4, &tail);

    let out = decompress(&frame, 4 + 0x100).unwrap();
    assert_eq!(&out[..4], &[tail[2], tail[0], tail[1], tail[2]]);
}

#[test]
fn test_long_run_uses_extended_length() {
    let tail = vec![0u8; TAIL_SIZE];
    // 3 literals, then one match of 3 + 3 + 7 + 31 + 255 + 10 = 309 bytes
    let frame = FrameBuilder::new()
        .literal(b'A')
        .literal(b'A')
        .literal(b'A')
        .backref(0, &[3, 7, 31, 255, 10])
        .finish(312, &tail);

    let out = decompress(&frame, 312 + 0x100).unwrap();
    assert!(out[..312].iter().all(|&b| b == b'A'));
    assert_eq!(&out[312..], &tail[..]);
}

#[test]
fn test_distance_reaches_older_output() {
    let tail = pattern_tail();
    let frame = FrameBuilder::new()
        .literal(b'4')
        .literal(b'3')
        .literal(b'2')
        .literal(b'1')
        .backref(1, &[0])
        .finish(7, &tail);

    let out = decompress(&frame, 7 + 0x100).unwrap();
    // positions 3..7 hold "1234"; the match at position 2 copies from 6, 5, 4
    assert_eq!(&out[..7], b"2341234");
}

#[test]
fn test_frame_without_magic() {
    let tail = pattern_tail();
    let mut frame = FrameBuilder::new().literal(b'k').finish(1, &tail);
    frame[..8].copy_from_slice(b"\0\0\0\0\0\0\0\0");

    let parsed = CrilaylaFrame::parse(&frame).unwrap();
    assert!(!parsed.has_magic());
    assert_eq!(decompress_frame(&frame).unwrap()[0], b'k');
}

#[test]
fn test_source_outside_output() {
    let frame = FrameBuilder::new()
        .backref(0x1FFF, &[0])
        .finish(1, &[0u8; TAIL_SIZE]);

    let err = decompress(&frame, 0x101).unwrap_err();
    assert!(matches!(err, CriArcError::CorruptedData { .. }));
}

#[test]
fn test_length_overruns_output() {
    let frame = FrameBuilder::new()
        .literal(1)
        .backref(0, &[0])
        .finish(2, &[0u8; TAIL_SIZE]);

    let err = decompress(&frame, 0x102).unwrap_err();
    assert!(matches!(err, CriArcError::CorruptedData { .. }));
}

#[test]
fn test_declared_size_must_match() {
    let frame = FrameBuilder::new()
        .literal(1)
        .finish(1, &[0u8; TAIL_SIZE]);

    assert!(matches!(
        decompress(&frame, 0x100),
        Err(CriArcError::SizeMismatch { .. })
    ));
}

#[test]
fn test_tail_beyond_input() {
    let mut frame = FrameBuilder::new()
        .literal(1)
        .finish(1, &[0u8; TAIL_SIZE]);
    frame.truncate(frame.len() - 1);

    assert!(decompress(&frame, 0x101).unwrap_err().is_truncated());
}
