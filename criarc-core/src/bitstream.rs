//! Bit-addressable buffers for CRI formats.
//!
//! This module provides three codecs sharing one contract:
//!
//! - [`BitCodec`]: growable, heap-owned buffer (grows in 1024-bit steps)
//! - [`FixedBitCodec`]: caller-owned buffer that never grows
//! - [`ReverseBitCodec`]: like `FixedBitCodec`, but byte `i` lives at
//!   `buffer_end - i - 1`
//!
//! The shared behaviour lives in the [`BitRead`] and [`BitWrite`] traits; a
//! codec only decides how a logical byte index maps onto its storage and
//! whether it may grow.
//!
//! # Bit Ordering
//!
//! All codecs are MSB-first: bit position 0 of a byte is its most significant
//! bit. `ReverseBitCodec` walks bytes backwards but keeps the same bit order
//! inside each byte, which is what CRILAYLA streams need.
//!
//! # Example
//!
//! ```
//! use criarc_core::bitstream::{BitCodec, BitRead, BitWrite};
//!
//! let mut codec = BitCodec::new();
//! codec.write_u8(0b101, 3).unwrap();
//! codec.write_i16(-2, 5).unwrap();
//!
//! codec.seek_bits(0).unwrap();
//! assert_eq!(codec.read_u8(3).unwrap(), 0b101);
//! assert_eq!(codec.read_i16(5).unwrap(), -2);
//! ```

use crate::error::{CriArcError, Result};

/// Allocation step of [`BitCodec`], in bits.
pub const GROWTH_STEP_BITS: usize = 1024;

/// Logical size and cursor of a bit buffer.
///
/// Invariant: `position <= size_bits`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitCursor {
    size_bits: usize,
    pos_bits: usize,
}

impl BitCursor {
    /// Create a cursor at position 0 over `size_bits` bits.
    pub fn new(size_bits: usize) -> Self {
        Self {
            size_bits,
            pos_bits: 0,
        }
    }

    /// Logical length in bits.
    pub fn size_bits(&self) -> usize {
        self.size_bits
    }

    /// Current position in bits.
    pub fn position(&self) -> usize {
        self.pos_bits
    }

    /// Bits between the cursor and the logical end.
    pub fn remaining(&self) -> usize {
        self.size_bits - self.pos_bits
    }

    pub(crate) fn seek(&mut self, pos_bits: usize) -> Result<()> {
        if pos_bits > self.size_bits {
            return Err(CriArcError::truncated(
                0,
                pos_bits.div_ceil(8) as u64,
                self.size_bits.div_ceil(8) as u64,
            ));
        }
        self.pos_bits = pos_bits;
        Ok(())
    }

    pub(crate) fn advance(&mut self, n_bits: usize) {
        debug_assert!(self.pos_bits + n_bits <= self.size_bits);
        self.pos_bits += n_bits;
    }

    pub(crate) fn set_size(&mut self, size_bits: usize) {
        self.size_bits = size_bits;
        self.pos_bits = self.pos_bits.min(size_bits);
    }
}

/// Read side of the bit codec contract.
///
/// Implementors supply storage access; every read operation is provided.
pub trait BitRead {
    /// The codec's size and position.
    fn cursor(&self) -> &BitCursor;

    /// Mutable access to the codec's size and position.
    fn cursor_mut(&mut self) -> &mut BitCursor;

    /// Fetch the byte at logical index `index` (`index < size_bytes()`).
    fn byte_at(&self, index: usize) -> u8;

    /// Whether a backing buffer exists at all.
    fn has_buffer(&self) -> bool {
        true
    }

    /// Logical length in bits.
    fn size_bits(&self) -> usize {
        self.cursor().size_bits()
    }

    /// Logical length in whole bytes, `ceil(size_bits / 8)`.
    fn size_bytes(&self) -> usize {
        self.size_bits().div_ceil(8)
    }

    /// Current cursor position in bits.
    fn bit_position(&self) -> usize {
        self.cursor().position()
    }

    /// Bits left before the logical end.
    fn remaining_bits(&self) -> usize {
        self.cursor().remaining()
    }

    /// Move the cursor to an absolute bit position.
    fn seek_bits(&mut self, pos_bits: usize) -> Result<()> {
        self.cursor_mut().seek(pos_bits)
    }

    /// Copy `n_bits` bits from the cursor into `dst`, MSB-first.
    ///
    /// Bits of `dst` past `n_bits` are left untouched.
    fn read_raw(&mut self, dst: &mut [u8], n_bits: usize) -> Result<()> {
        let pos = self.bit_position();
        if !self.has_buffer() || n_bits > self.remaining_bits() {
            return Err(CriArcError::BitsExhausted {
                position: pos,
                requested: n_bits,
                size: self.size_bits(),
            });
        }
        if n_bits > dst.len() * 8 {
            return Err(CriArcError::invalid_bit_width(
                n_bits as u32,
                (dst.len() * 8) as u32,
            ));
        }

        for i in 0..n_bits {
            let src = pos + i;
            let bit = (self.byte_at(src / 8) >> (7 - src % 8)) & 1;
            let mask = 0x80u8 >> (i % 8);
            if bit != 0 {
                dst[i / 8] |= mask;
            } else {
                dst[i / 8] &= !mask;
            }
        }

        self.cursor_mut().advance(n_bits);
        Ok(())
    }

    /// Read a single bit.
    fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Read up to 64 bits as an unsigned value right-aligned in a `u64`.
    fn read_bits(&mut self, n_bits: u32) -> Result<u64> {
        check_width(n_bits, 64)?;
        let mut raw = [0u8; 8];
        self.read_raw(&mut raw, n_bits as usize)?;
        if n_bits == 0 {
            return Ok(0);
        }
        Ok(u64::from_be_bytes(raw) >> (64 - n_bits))
    }

    /// Read an unsigned value of `n_bits <= 8` bits.
    fn read_u8(&mut self, n_bits: u32) -> Result<u8> {
        check_width(n_bits, 8)?;
        Ok(self.read_bits(n_bits)? as u8)
    }

    /// Read an unsigned value of `n_bits <= 16` bits.
    fn read_u16(&mut self, n_bits: u32) -> Result<u16> {
        check_width(n_bits, 16)?;
        Ok(self.read_bits(n_bits)? as u16)
    }

    /// Read an unsigned value of `n_bits <= 32` bits.
    fn read_u32(&mut self, n_bits: u32) -> Result<u32> {
        check_width(n_bits, 32)?;
        Ok(self.read_bits(n_bits)? as u32)
    }

    /// Read an unsigned value of `n_bits <= 64` bits.
    fn read_u64(&mut self, n_bits: u32) -> Result<u64> {
        self.read_bits(n_bits)
    }

    /// Read a sign-extended value of `n_bits <= 8` bits.
    fn read_i8(&mut self, n_bits: u32) -> Result<i8> {
        let raw = self.read_u8(n_bits)?;
        Ok(sign_extend(raw.into(), n_bits) as i8)
    }

    /// Read a sign-extended value of `n_bits <= 16` bits.
    fn read_i16(&mut self, n_bits: u32) -> Result<i16> {
        let raw = self.read_u16(n_bits)?;
        Ok(sign_extend(raw.into(), n_bits) as i16)
    }

    /// Read a sign-extended value of `n_bits <= 32` bits.
    fn read_i32(&mut self, n_bits: u32) -> Result<i32> {
        let raw = self.read_u32(n_bits)?;
        Ok(sign_extend(raw.into(), n_bits) as i32)
    }

    /// Read a sign-extended value of `n_bits <= 64` bits.
    fn read_i64(&mut self, n_bits: u32) -> Result<i64> {
        let raw = self.read_u64(n_bits)?;
        Ok(sign_extend(raw, n_bits) as i64)
    }
}

/// Write side of the bit codec contract.
pub trait BitWrite: BitRead {
    /// Change the logical size.
    ///
    /// Growable codecs allocate; fixed codecs always fail.
    fn resize(&mut self, new_size_bits: usize) -> Result<()>;

    /// Store the byte at logical index `index` (`index < size_bytes()`).
    fn set_byte_at(&mut self, index: usize, value: u8);

    /// Copy `n_bits` bits from `src` (MSB-first) to the cursor, growing the
    /// buffer when the write runs past the logical end.
    fn write_raw(&mut self, src: &[u8], n_bits: usize) -> Result<()> {
        if n_bits > src.len() * 8 {
            return Err(CriArcError::invalid_bit_width(
                n_bits as u32,
                (src.len() * 8) as u32,
            ));
        }

        let pos = self.bit_position();
        let end = pos + n_bits;
        if end > self.size_bits() {
            self.resize(end)?;
        }

        for i in 0..n_bits {
            let bit = (src[i / 8] >> (7 - i % 8)) & 1;
            let dst = pos + i;
            let mask = 0x80u8 >> (dst % 8);
            let byte = self.byte_at(dst / 8);
            let byte = if bit != 0 { byte | mask } else { byte & !mask };
            self.set_byte_at(dst / 8, byte);
        }

        self.cursor_mut().advance(n_bits);
        Ok(())
    }

    /// Write a single bit.
    fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.write_bits(u64::from(bit), 1)
    }

    /// Write the low `n_bits` bits of `value`, most significant first.
    fn write_bits(&mut self, value: u64, n_bits: u32) -> Result<()> {
        check_width(n_bits, 64)?;
        if n_bits == 0 {
            return self.write_raw(&[], 0);
        }
        let raw = (value << (64 - n_bits)).to_be_bytes();
        self.write_raw(&raw, n_bits as usize)
    }

    /// Write the low `n_bits <= 8` bits of `value`.
    fn write_u8(&mut self, value: u8, n_bits: u32) -> Result<()> {
        check_width(n_bits, 8)?;
        self.write_bits(value.into(), n_bits)
    }

    /// Write the low `n_bits <= 16` bits of `value`.
    fn write_u16(&mut self, value: u16, n_bits: u32) -> Result<()> {
        check_width(n_bits, 16)?;
        self.write_bits(value.into(), n_bits)
    }

    /// Write the low `n_bits <= 32` bits of `value`.
    fn write_u32(&mut self, value: u32, n_bits: u32) -> Result<()> {
        check_width(n_bits, 32)?;
        self.write_bits(value.into(), n_bits)
    }

    /// Write the low `n_bits <= 64` bits of `value`.
    fn write_u64(&mut self, value: u64, n_bits: u32) -> Result<()> {
        self.write_bits(value, n_bits)
    }

    /// Write the low `n_bits <= 8` bits of a signed value.
    fn write_i8(&mut self, value: i8, n_bits: u32) -> Result<()> {
        self.write_u8(value as u8, n_bits)
    }

    /// Write the low `n_bits <= 16` bits of a signed value.
    fn write_i16(&mut self, value: i16, n_bits: u32) -> Result<()> {
        self.write_u16(value as u16, n_bits)
    }

    /// Write the low `n_bits <= 32` bits of a signed value.
    fn write_i32(&mut self, value: i32, n_bits: u32) -> Result<()> {
        self.write_u32(value as u32, n_bits)
    }

    /// Write the low `n_bits <= 64` bits of a signed value.
    fn write_i64(&mut self, value: i64, n_bits: u32) -> Result<()> {
        self.write_u64(value as u64, n_bits)
    }
}

#[inline]
fn check_width(n_bits: u32, max: u32) -> Result<()> {
    if n_bits > max {
        return Err(CriArcError::invalid_bit_width(n_bits, max));
    }
    Ok(())
}

/// Set every bit above bit `n_bits - 1` when that bit is set.
#[inline]
fn sign_extend(value: u64, n_bits: u32) -> u64 {
    if n_bits == 0 || n_bits >= 64 {
        return value;
    }
    if (value >> (n_bits - 1)) & 1 != 0 {
        value | (u64::MAX << n_bits)
    } else {
        value
    }
}

/// Growable, heap-owned bit buffer.
///
/// Capacity grows by at least [`GROWTH_STEP_BITS`] each time a write or
/// resize runs past it. The buffer can be handed to the caller with
/// [`BitCodec::take_buffer`], after which the codec is empty again.
#[derive(Debug, Clone, Default)]
pub struct BitCodec {
    buffer: Vec<u8>,
    cursor: BitCursor,
}

impl BitCodec {
    /// Create an empty codec with no allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt `bytes` as the buffer; the logical size covers all of it.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let cursor = BitCursor::new(bytes.len() * 8);
        Self {
            buffer: bytes,
            cursor,
        }
    }

    /// Allocated length in bits.
    pub fn capacity_bits(&self) -> usize {
        self.buffer.len() * 8
    }

    /// The logical bytes, `size_bytes()` long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.size_bytes()]
    }

    /// Transfer the buffer to the caller and reset to empty.
    ///
    /// The returned vector is truncated to `size_bytes()`.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        let size_bytes = self.size_bytes();
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.truncate(size_bytes);
        self.cursor = BitCursor::default();
        buffer
    }
}

impl BitRead for BitCodec {
    fn cursor(&self) -> &BitCursor {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut BitCursor {
        &mut self.cursor
    }

    #[inline]
    fn byte_at(&self, index: usize) -> u8 {
        self.buffer[index]
    }

    fn has_buffer(&self) -> bool {
        !self.buffer.is_empty()
    }
}

impl BitWrite for BitCodec {
    fn resize(&mut self, new_size_bits: usize) -> Result<()> {
        if new_size_bits == 0 {
            self.buffer = Vec::new();
            self.cursor = BitCursor::default();
            return Ok(());
        }

        let capacity = self.capacity_bits();
        if new_size_bits > capacity {
            let grown = new_size_bits.max(capacity + GROWTH_STEP_BITS);
            self.buffer.resize(grown.div_ceil(8), 0);
        }

        self.cursor.set_size(new_size_bits);
        Ok(())
    }

    #[inline]
    fn set_byte_at(&mut self, index: usize, value: u8) {
        self.buffer[index] = value;
    }
}

/// Bit buffer over caller-owned storage that never grows.
///
/// Reading needs `B: AsRef<[u8]>`; writing additionally needs
/// `B: AsMut<[u8]>`. Writes past the end fail instead of growing.
#[derive(Debug)]
pub struct FixedBitCodec<B> {
    buffer: B,
    cursor: BitCursor,
}

impl<B: AsRef<[u8]>> FixedBitCodec<B> {
    /// Wrap `buffer`; the logical size covers all of it.
    pub fn new(buffer: B) -> Self {
        let cursor = BitCursor::new(buffer.as_ref().len() * 8);
        Self { buffer, cursor }
    }

    /// Wrap `buffer` with a logical size shorter than its length.
    pub fn with_size_bits(buffer: B, size_bits: usize) -> Result<Self> {
        let available = buffer.as_ref().len();
        if size_bits > available * 8 {
            return Err(CriArcError::truncated(
                0,
                size_bits.div_ceil(8) as u64,
                available as u64,
            ));
        }
        Ok(Self {
            buffer,
            cursor: BitCursor::new(size_bits),
        })
    }

    /// Get a reference to the backing storage.
    pub fn get_ref(&self) -> &B {
        &self.buffer
    }

    /// Consume the codec and return the backing storage.
    pub fn into_inner(self) -> B {
        self.buffer
    }
}

impl<B: AsRef<[u8]>> BitRead for FixedBitCodec<B> {
    fn cursor(&self) -> &BitCursor {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut BitCursor {
        &mut self.cursor
    }

    #[inline]
    fn byte_at(&self, index: usize) -> u8 {
        self.buffer.as_ref()[index]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitWrite for FixedBitCodec<B> {
    fn resize(&mut self, new_size_bits: usize) -> Result<()> {
        Err(CriArcError::fixed_capacity(new_size_bits))
    }

    #[inline]
    fn set_byte_at(&mut self, index: usize, value: u8) {
        self.buffer.as_mut()[index] = value;
    }
}

/// Fixed bit buffer addressed from its last byte toward its first.
///
/// Logical byte `i` is stored at `buffer[len - i - 1]`; bit order inside a
/// byte is still MSB-first. Reading `n` bits at position `p` yields the same
/// bits as a forward codec over the byte-reversed buffer.
#[derive(Debug)]
pub struct ReverseBitCodec<B> {
    buffer: B,
    cursor: BitCursor,
}

impl<B: AsRef<[u8]>> ReverseBitCodec<B> {
    /// Wrap `buffer`; the logical size covers all of it.
    pub fn new(buffer: B) -> Self {
        let cursor = BitCursor::new(buffer.as_ref().len() * 8);
        Self { buffer, cursor }
    }

    /// Get a reference to the backing storage.
    pub fn get_ref(&self) -> &B {
        &self.buffer
    }

    /// Consume the codec and return the backing storage.
    pub fn into_inner(self) -> B {
        self.buffer
    }

    #[inline]
    fn physical(&self, index: usize) -> usize {
        self.buffer.as_ref().len() - index - 1
    }
}

impl<B: AsRef<[u8]>> BitRead for ReverseBitCodec<B> {
    fn cursor(&self) -> &BitCursor {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut BitCursor {
        &mut self.cursor
    }

    #[inline]
    fn byte_at(&self, index: usize) -> u8 {
        self.buffer.as_ref()[self.physical(index)]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitWrite for ReverseBitCodec<B> {
    fn resize(&mut self, new_size_bits: usize) -> Result<()> {
        Err(CriArcError::fixed_capacity(new_size_bits))
    }

    #[inline]
    fn set_byte_at(&mut self, index: usize, value: u8) {
        let physical = self.physical(index);
        self.buffer.as_mut()[physical] = value;
    }
}

/// Minimum bits needed for an unsigned value; 1 for zero.
pub fn min_bits_u64(value: u64) -> u32 {
    (u64::BITS - value.leading_zeros()).max(1)
}

/// Minimum bits needed for an unsigned value; 1 for zero.
pub fn min_bits_u32(value: u32) -> u32 {
    min_bits_u64(value.into())
}

/// Minimum bits needed for an unsigned value; 1 for zero.
pub fn min_bits_u16(value: u16) -> u32 {
    min_bits_u64(value.into())
}

/// Minimum bits needed for an unsigned value; 1 for zero.
pub fn min_bits_u8(value: u8) -> u32 {
    min_bits_u64(value.into())
}

/// Bits for a signed value: positive values get an extra sign bit, zero and
/// negative values use the width of their magnitude.
pub fn min_bits_s64(value: i64) -> u32 {
    if value > 0 {
        min_bits_u64(value as u64) + 1
    } else {
        min_bits_u64(value.unsigned_abs())
    }
}

/// Bits for a signed value, see [`min_bits_s64`].
pub fn min_bits_s32(value: i32) -> u32 {
    if value > 0 {
        min_bits_u32(value as u32) + 1
    } else {
        min_bits_u32(value.unsigned_abs())
    }
}

/// Bits for a signed value, see [`min_bits_s64`].
pub fn min_bits_s16(value: i16) -> u32 {
    if value > 0 {
        min_bits_u16(value as u16) + 1
    } else {
        min_bits_u16(value.unsigned_abs())
    }
}

/// Bits for a signed value, see [`min_bits_s64`].
pub fn min_bits_s8(value: i8) -> u32 {
    if value > 0 {
        min_bits_u8(value as u8) + 1
    } else {
        min_bits_u8(value.unsigned_abs())
    }
}
