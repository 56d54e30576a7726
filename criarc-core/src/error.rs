//! Error types for criarc operations.
//!
//! A single error type covers the bit codecs, the CRILAYLA decoder and the
//! AFS2/CPK containers, so that a failure anywhere in the stack surfaces as one
//! outcome with a human-readable diagnostic.

use std::io;
use thiserror::Error;

/// The main error type for criarc operations.
#[derive(Debug, Error)]
pub enum CriArcError {
    /// I/O error from an underlying reader, writer or external file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid magic number in a header.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// A read would cross the end of the available data.
    #[error("Truncated input at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        /// Offset at which the read started.
        offset: u64,
        /// Number of bytes the read needed.
        needed: u64,
        /// Number of bytes available from `offset`.
        available: u64,
    },

    /// Declared size disagrees with the size recorded in the data itself.
    #[error("Size mismatch: declared {declared} bytes, data describes {actual}")]
    SizeMismatch {
        /// Size declared by the caller or the container.
        declared: u64,
        /// Size derived from the payload's own fields.
        actual: u64,
    },

    /// Feature outside what this engine handles.
    #[error("Unsupported feature: {feature}")]
    Unsupported {
        /// Description of the unsupported feature.
        feature: String,
    },

    /// A bit read would cross the logical end of a bit buffer.
    #[error("Bit buffer exhausted at bit {position}: need {requested} bits, size is {size}")]
    BitsExhausted {
        /// Cursor position in bits.
        position: usize,
        /// Number of bits requested.
        requested: usize,
        /// Logical size of the buffer in bits.
        size: usize,
    },

    /// Typed bit accessor called with too many bits.
    #[error("Invalid bit width: {bits} (maximum {max})")]
    InvalidBitWidth {
        /// Requested number of bits.
        bits: u32,
        /// Width of the accessor.
        max: u32,
    },

    /// Attempt to resize a codec whose backing buffer cannot change.
    #[error("Fixed-capacity bit buffer cannot be resized to {requested_bits} bits")]
    FixedCapacity {
        /// Size that was requested, in bits.
        requested_bits: usize,
    },

    /// Corrupted data detected while decoding.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name or index of the missing entry.
        name: String,
    },
}

/// Result type alias for criarc operations.
pub type Result<T> = std::result::Result<T, CriArcError>;

impl CriArcError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a truncated input error.
    pub fn truncated(offset: u64, needed: u64, available: u64) -> Self {
        Self::Truncated {
            offset,
            needed,
            available,
        }
    }

    /// Create a size mismatch error.
    pub fn size_mismatch(declared: u64, actual: u64) -> Self {
        Self::SizeMismatch { declared, actual }
    }

    /// Create an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    /// Create an invalid bit width error.
    pub fn invalid_bit_width(bits: u32, max: u32) -> Self {
        Self::InvalidBitWidth { bits, max }
    }

    /// Create a fixed capacity error.
    pub fn fixed_capacity(requested_bits: usize) -> Self {
        Self::FixedCapacity { requested_bits }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Check whether this error reports truncated input.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::BitsExhausted { .. })
    }

    /// Check whether this error reports an unsupported feature.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
