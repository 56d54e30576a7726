//! # CriArc CRILAYLA
//!
//! Pure Rust implementation of CRILAYLA decompression.
//!
//! CRILAYLA is the LZ77-style scheme CRI Middleware uses for compressed CPK
//! entries. A frame stores:
//!
//! - a 16-byte header with the size of the compressed body
//! - a bitstream that is read from its last byte toward its first
//! - a 0x100-byte block stored verbatim
//!
//! The decoder fills the output from the end toward the start, placing the
//! verbatim block at the end and decoding literal and back-reference tokens
//! below it.
//!
//! ## Example
//!
//! ```rust
//! use criarc_crilayla::{CrilaylaFrame, decompress};
//!
//! // A frame with an empty bitstream decodes to its verbatim block.
//! let mut frame = b"CRILAYLA".to_vec();
//! frame.extend_from_slice(&0u32.to_le_bytes()); // raw_size
//! frame.extend_from_slice(&0u32.to_le_bytes()); // header_offset
//! frame.extend_from_slice(&[0xAB; 0x100]);
//!
//! let parsed = CrilaylaFrame::parse(&frame).unwrap();
//! assert_eq!(parsed.uncompressed_size(), 0x100);
//!
//! let output = decompress(&frame, 0x100).unwrap();
//! assert_eq!(output, vec![0xAB; 0x100]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod decode;
pub mod frame;

// Re-exports
pub use decode::{CrilaylaDecoder, decompress, decompress_frame};
pub use frame::{CRILAYLA_MAGIC, CrilaylaFrame, HEADER_SIZE, TAIL_SIZE, is_crilayla};
