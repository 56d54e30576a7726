//! CRILAYLA frame layout.
//!
//! ```text
//! 0x00  tag            8 bytes, "CRILAYLA" (not validated)
//! 0x08  raw_size       u32 LE, bytes produced by the bitstream
//! 0x0C  header_offset  u32 LE
//! 0x10  ...            backward bitstream ends at header_offset + 0x10
//! header_offset + 0x10 verbatim tail, 0x100 bytes
//! ```

use criarc_core::arena::ByteArena;
use criarc_core::error::{CriArcError, Result};

/// Magic tag found at the start of most frames.
pub const CRILAYLA_MAGIC: &[u8; 8] = b"CRILAYLA";

/// Fixed header length.
pub const HEADER_SIZE: usize = 0x10;

/// Length of the verbatim tail.
pub const TAIL_SIZE: usize = 0x100;

/// Check whether `data` starts with the CRILAYLA tag.
///
/// Only used for detection and display; decoding never requires it.
pub fn is_crilayla(data: &[u8]) -> bool {
    data.starts_with(CRILAYLA_MAGIC)
}

/// Read the little-endian `raw_size` field.
pub(crate) fn read_raw_size(data: &[u8]) -> Result<u32> {
    header(data)?.read_u32_le_at(8)
}

fn header(data: &[u8]) -> Result<ByteArena> {
    match data.get(..HEADER_SIZE) {
        Some(fixed) => Ok(ByteArena::from(fixed.to_vec())),
        None => Err(CriArcError::truncated(
            0,
            HEADER_SIZE as u64,
            data.len() as u64,
        )),
    }
}

/// A parsed view over a CRILAYLA frame.
#[derive(Debug, Clone, Copy)]
pub struct CrilaylaFrame<'a> {
    /// Bytes produced by the bitstream.
    pub raw_size: u32,
    /// Offset of the tail, minus the header size.
    pub header_offset: u32,
    bitstream: &'a [u8],
    tail: &'a [u8],
}

impl<'a> CrilaylaFrame<'a> {
    /// Parse the frame header and locate the bitstream and tail.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let fixed = header(data)?;
        let raw_size = fixed.read_u32_le_at(8)?;
        let header_offset = fixed.read_u32_le_at(12)?;

        let tail_start = header_offset as usize + HEADER_SIZE;
        let tail_end = tail_start + TAIL_SIZE;
        if tail_end > data.len() {
            return Err(CriArcError::truncated(
                tail_start as u64,
                TAIL_SIZE as u64,
                data.len().saturating_sub(tail_start) as u64,
            ));
        }

        Ok(Self {
            raw_size,
            header_offset,
            bitstream: &data[..tail_start],
            tail: &data[tail_start..tail_end],
        })
    }

    /// Total decoded size, `raw_size + 0x100`.
    pub fn uncompressed_size(&self) -> u64 {
        u64::from(self.raw_size) + TAIL_SIZE as u64
    }

    /// The bytes read backward by the decoder.
    pub fn bitstream(&self) -> &'a [u8] {
        self.bitstream
    }

    /// The verbatim tail.
    pub fn tail(&self) -> &'a [u8] {
        self.tail
    }

    /// Check whether the frame carries the magic tag.
    pub fn has_magic(&self) -> bool {
        is_crilayla(self.bitstream)
    }
}
