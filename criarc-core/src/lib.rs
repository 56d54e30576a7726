//! # CriArc Core
//!
//! Core components for the criarc container library.
//!
//! This crate provides the fundamental building blocks shared by the CRI
//! codecs:
//!
//! - [`bitstream`]: MSB-first bit codecs (growable, fixed and reversed)
//! - [`arena`]: Growable byte buffer with offset-addressed typed access
//! - [`source`]: Seekable input addressed by absolute offset
//! - [`entry`]: Container entries and payload locations
//! - [`traits`]: Reader/writer traits implemented by every container
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! criarc is designed as a layered stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: Tooling                                             │
//! │     criarc CLI                                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Container                                           │
//! │     AFS2/AWB, CPK (TOC/ITOC/ETOC), @UTF tables         │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     CRILAYLA                                            │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Primitives (this crate)                             │
//! │     BitCodec family, ByteArena, SourceHandle            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use criarc_core::arena::ByteArena;
//! use criarc_core::bitstream::{BitRead, ReverseBitCodec};
//!
//! // Read bits from the end of a buffer toward its start
//! let data = [0x00, 0x80];
//! let mut codec = ReverseBitCodec::new(&data[..]);
//! assert!(codec.read_bit().unwrap());
//!
//! // Assemble a little-endian header
//! let mut header = ByteArena::new();
//! header.write_u32_le_at(0, 0x3253_4641);
//! assert_eq!(header.as_slice(), b"AFS2");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod arena;
pub mod bitstream;
pub mod entry;
pub mod error;
pub mod source;
pub mod traits;

// Re-exports for convenience
pub use arena::ByteArena;
pub use bitstream::{BitCodec, BitCursor, BitRead, BitWrite, FixedBitCodec, ReverseBitCodec};
pub use entry::{EntryData, EntryInfo};
pub use error::{CriArcError, Result};
pub use source::SourceHandle;
pub use traits::{ArchiveReader, ArchiveWriter};

/// Align `value` up to the next multiple of `align`.
///
/// An alignment of 0 or 1 leaves the value unchanged.
pub fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::arena::ByteArena;
    pub use crate::bitstream::{BitCodec, BitRead, BitWrite, FixedBitCodec, ReverseBitCodec};
    pub use crate::entry::{EntryData, EntryInfo};
    pub use crate::error::{CriArcError, Result};
    pub use crate::source::SourceHandle;
    pub use crate::traits::{ArchiveReader, ArchiveWriter};
}
