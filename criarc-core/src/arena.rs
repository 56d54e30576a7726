//! Growable byte buffer with bounds-checked offset access.
//!
//! [`ByteArena`] is the scratch space container codecs use to assemble
//! headers and tables before emitting them. Reads are checked and fail with
//! [`CriArcError::Truncated`]; writes at an offset past the end grow the
//! arena with zero bytes.

use crate::error::{CriArcError, Result};

macro_rules! arena_int {
    ($read:ident, $write:ident, $ty:ty, $from:ident, $to:ident) => {
        #[doc = concat!("Read a `", stringify!($ty), "` at `offset`.")]
        pub fn $read(&self, offset: usize) -> Result<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            let mut raw = [0u8; N];
            raw.copy_from_slice(self.read_bytes_at(offset, N)?);
            Ok(<$ty>::$from(raw))
        }

        #[doc = concat!("Write a `", stringify!($ty), "` at `offset`, growing as needed.")]
        pub fn $write(&mut self, offset: usize, value: $ty) {
            self.write_bytes_at(offset, &value.$to());
        }
    };
}

/// Owned byte buffer with typed accessors at absolute offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteArena {
    data: Vec<u8>,
}

impl ByteArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty arena with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the arena holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// View the contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the arena and return its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn read_bytes_at(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                CriArcError::truncated(
                    offset as u64,
                    len as u64,
                    self.data.len().saturating_sub(offset) as u64,
                )
            })?;
        Ok(&self.data[offset..end])
    }

    /// Copy `bytes` to `offset`, zero-filling any gap past the current end.
    pub fn write_bytes_at(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(bytes);
    }

    /// Append bytes and return the offset they were written at.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Zero-pad the arena to a multiple of `align` (no-op for `align <= 1`).
    pub fn pad_to(&mut self, align: usize) {
        if align > 1 {
            let padded = self.data.len().next_multiple_of(align);
            self.data.resize(padded, 0);
        }
    }

    /// Read a byte at `offset`.
    pub fn read_u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.read_bytes_at(offset, 1)?[0])
    }

    arena_int!(read_u16_le_at, write_u16_le_at, u16, from_le_bytes, to_le_bytes);
    arena_int!(read_u16_be_at, write_u16_be_at, u16, from_be_bytes, to_be_bytes);
    arena_int!(read_u32_le_at, write_u32_le_at, u32, from_le_bytes, to_le_bytes);
    arena_int!(read_u32_be_at, write_u32_be_at, u32, from_be_bytes, to_be_bytes);
    arena_int!(read_u64_le_at, write_u64_le_at, u64, from_le_bytes, to_le_bytes);
    arena_int!(read_u64_be_at, write_u64_be_at, u64, from_be_bytes, to_be_bytes);
}

impl From<Vec<u8>> for ByteArena {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for ByteArena {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
