//! CRILAYLA decompression.
//!
//! The bitstream is read from the end of the frame toward its start, and
//! output is produced from the end of the buffer toward its start. Each token
//! is a flag bit followed by either an 8-bit literal or a back-reference.

use crate::frame::{CrilaylaFrame, TAIL_SIZE, read_raw_size};
use criarc_core::bitstream::{BitRead, ReverseBitCodec};
use criarc_core::error::{CriArcError, Result};
use tracing::{debug, trace};

/// Width of the back-reference distance field.
const DISTANCE_BITS: u32 = 13;

/// Minimum match length.
const MIN_MATCH: usize = 3;

/// Widths of the escalating length fields; the last one repeats.
const LENGTH_FIELD_BITS: [u32; 4] = [2, 3, 5, 8];

/// Upper bound on output bytes per input bit; an extension field yields at
/// most 255 bytes from 8 bits.
const MAX_OUTPUT_PER_BIT: u64 = 32;

/// CRILAYLA decompressor.
#[derive(Debug, Clone)]
pub struct CrilaylaDecoder {
    /// Size the caller expects, including the tail.
    uncompressed_size: u64,
}

impl CrilaylaDecoder {
    /// Create a decoder for a frame that should expand to `uncompressed_size`.
    pub fn new(uncompressed_size: u64) -> Self {
        Self { uncompressed_size }
    }

    /// Expected output size.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Decode a complete frame.
    pub fn decode(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let raw_size = read_raw_size(compressed)?;
        let expected = u64::from(raw_size) + TAIL_SIZE as u64;
        if expected != self.uncompressed_size {
            return Err(CriArcError::size_mismatch(self.uncompressed_size, expected));
        }

        let frame = CrilaylaFrame::parse(compressed)?;
        debug!(
            raw_size = frame.raw_size,
            header_offset = frame.header_offset,
            "decoding CRILAYLA frame"
        );

        let producible = frame.bitstream().len() as u64 * 8 * MAX_OUTPUT_PER_BIT;
        if u64::from(raw_size) > producible {
            return Err(CriArcError::corrupted(
                8,
                format!(
                    "raw_size {raw_size} exceeds the {producible} bytes a {}-byte bitstream can produce",
                    frame.bitstream().len()
                ),
            ));
        }

        let raw_len = raw_size as usize;
        let mut output = vec![0u8; raw_len + TAIL_SIZE];
        output[raw_len..].copy_from_slice(frame.tail());

        let mut bits = ReverseBitCodec::new(frame.bitstream());
        let mut produced = 0usize;

        while produced < raw_len {
            let pos = raw_len - produced - 1;

            if !bits.read_bit()? {
                output[pos] = bits.read_u8(8)?;
                produced += 1;
                continue;
            }

            let distance = bits.read_u16(DISTANCE_BITS)? as usize;
            let length = read_match_length(&mut bits)?;
            let source = pos + distance + MIN_MATCH;

            if source >= output.len() {
                return Err(CriArcError::corrupted(
                    pos as u64,
                    format!("back-reference source {source} outside output"),
                ));
            }
            if length > raw_len - produced {
                return Err(CriArcError::corrupted(
                    pos as u64,
                    format!(
                        "match length {length} overruns remaining {} bytes",
                        raw_len - produced
                    ),
                ));
            }

            trace!(pos, distance, length, "back-reference");

            // Ranges may overlap, so copy one byte at a time.
            for i in 0..length {
                output[pos - i] = output[source - i];
            }
            produced += length;
        }

        Ok(output)
    }
}

fn read_match_length<B: AsRef<[u8]>>(bits: &mut ReverseBitCodec<B>) -> Result<usize> {
    let mut length = MIN_MATCH;

    for &width in &LENGTH_FIELD_BITS {
        let max = (1usize << width) - 1;
        let value = bits.read_u8(width)? as usize;
        length += value;
        if value != max {
            return Ok(length);
        }
    }

    loop {
        let value = bits.read_u8(8)? as usize;
        length += value;
        if value != 0xFF {
            return Ok(length);
        }
    }
}

/// Decompress a CRILAYLA frame to exactly `uncompressed_size` bytes.
///
/// `uncompressed_size` must equal the frame's `raw_size + 0x100`.
pub fn decompress(compressed: &[u8], uncompressed_size: u64) -> Result<Vec<u8>> {
    CrilaylaDecoder::new(uncompressed_size).decode(compressed)
}

/// Decompress a frame using the size recorded in its own header.
pub fn decompress_frame(compressed: &[u8]) -> Result<Vec<u8>> {
    let raw_size = read_raw_size(compressed)?;
    decompress(compressed, u64::from(raw_size) + TAIL_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use criarc_core::bitstream::{BitCodec, BitWrite};

    fn build_frame(raw_size: u32, write: impl FnOnce(&mut BitCodec), tail: &[u8]) -> Vec<u8> {
        let mut codec = BitCodec::new();
        write(&mut codec);
        let mut stream = codec.take_buffer();
        stream.reverse();

        let mut frame = b"CRILAYLA".to_vec();
        frame.extend_from_slice(&raw_size.to_le_bytes());
        frame.extend_from_slice(&(stream.len() as u32).to_le_bytes());
        frame.extend_from_slice(&stream);
        frame.extend_from_slice(tail);
        frame
    }

    fn literal(codec: &mut BitCodec, byte: u8) {
        codec.write_bit(false).unwrap();
        codec.write_u8(byte, 8).unwrap();
    }

    #[test]
    fn test_literals_only() {
        let tail = [0x5Au8; TAIL_SIZE];
        let frame = build_frame(
            3,
            |c| {
                literal(c, b'c');
                literal(c, b'b');
                literal(c, b'a');
            },
            &tail,
        );
        let out = decompress(&frame, 3 + 0x100).unwrap();
        assert_eq!(&out[..3], b"abc");
        assert_eq!(&out[3..], &tail[..]);
    }

    #[test]
    fn test_empty_body() {
        let tail: Vec<u8> = (0..=255).collect();
        let frame = build_frame(0, |_| {}, &tail);
        assert_eq!(decompress(&frame, 0x100).unwrap(), tail);
    }

    #[test]
    fn test_size_mismatch() {
        let frame = build_frame(3, |_| {}, &[0u8; TAIL_SIZE]);
        let err = decompress(&frame, 3).unwrap_err();
        assert!(matches!(
            err,
            CriArcError::SizeMismatch {
                declared: 3,
                actual: 0x103
            }
        ));
    }

    #[test]
    fn test_short_input() {
        assert!(decompress(b"CRILAYLA\0\0", 0x100).unwrap_err().is_truncated());
    }

    #[test]
    fn test_raw_size_beyond_bitstream_capacity() {
        let frame = build_frame(u32::MAX, |c| literal(c, 1), &[0u8; TAIL_SIZE]);
        assert!(matches!(
            decompress_frame(&frame),
            Err(CriArcError::CorruptedData { offset: 8, .. })
        ));
    }

    #[test]
    fn test_decompress_frame_uses_header_size() {
        let frame = build_frame(1, |c| literal(c, 7), &[1u8; TAIL_SIZE]);
        let out = decompress_frame(&frame).unwrap();
        assert_eq!(out.len(), 0x101);
        assert_eq!(out[0], 7);
    }
}
