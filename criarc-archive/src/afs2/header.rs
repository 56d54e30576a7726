//! AFS2 header and offset-table layout.
//!
//! ```text
//! 0x00  signature  "AFS2"
//! 0x04  version    4 bytes; byte 1 == 2 selects 16-bit offsets
//! 0x08  file_count u32 LE
//! 0x0C  alignment  u32 LE
//! 0x10  cue ids    u16 LE x file_count
//!       offsets    u16/u32 LE x (file_count + 1)
//! ```

use criarc_core::align_up;
use criarc_core::arena::ByteArena;
use criarc_core::error::{CriArcError, Result};
use tracing::debug;

/// "AFS2" read as a little-endian `u32`.
pub const AFS2_SIGNATURE: u32 = 0x3253_4641;

/// Version bytes for a new archive (16-bit offsets).
pub const DEFAULT_VERSION: [u8; 4] = [0x01, 0x02, 0x02, 0x00];

/// Default payload alignment.
pub const DEFAULT_ALIGNMENT: u32 = 0x20;

/// Size of the fixed header.
pub const FIXED_HEADER_SIZE: u64 = 0x10;

/// Width of one cue id.
const CUE_ID_SIZE: u64 = 2;

/// Width of the offset table entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetWidth {
    /// 16-bit offsets.
    Narrow,
    /// 32-bit offsets.
    Wide,
}

impl OffsetWidth {
    /// Select the width from the version bytes.
    pub fn from_version(version: [u8; 4]) -> Self {
        if version[1] == 2 {
            Self::Narrow
        } else {
            Self::Wide
        }
    }

    /// Bytes per offset.
    pub fn bytes(self) -> u64 {
        match self {
            Self::Narrow => 2,
            Self::Wide => 4,
        }
    }

    /// Version byte 1 recording this width.
    pub fn version_tag(self) -> u8 {
        match self {
            Self::Narrow => 0x02,
            Self::Wide => 0x04,
        }
    }

    /// First offset value that does not fit.
    pub fn limit(self) -> u64 {
        match self {
            Self::Narrow => 1 << 16,
            Self::Wide => 1 << 32,
        }
    }
}

impl std::fmt::Display for OffsetWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Narrow => write!(f, "16-bit"),
            Self::Wide => write!(f, "32-bit"),
        }
    }
}

/// Fixed AFS2 header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Afs2Header {
    /// Version bytes.
    pub version: [u8; 4],
    /// Number of entries.
    pub file_count: u32,
    /// Payload alignment.
    pub alignment: u32,
}

impl Afs2Header {
    /// Parse the fixed header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let fixed = ByteArena::from(bytes.to_vec());
        let signature = fixed.read_u32_le_at(0)?;
        if signature != AFS2_SIGNATURE {
            return Err(CriArcError::invalid_magic(
                b"AFS2".to_vec(),
                signature.to_le_bytes().to_vec(),
            ));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(fixed.read_bytes_at(4, 4)?);
        Ok(Self {
            version,
            file_count: fixed.read_u32_le_at(8)?,
            alignment: fixed.read_u32_le_at(12)?,
        })
    }

    /// Serialize the fixed header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut fixed = ByteArena::with_capacity(FIXED_HEADER_SIZE as usize);
        fixed.write_u32_le_at(0, AFS2_SIGNATURE);
        fixed.write_bytes_at(4, &self.version);
        fixed.write_u32_le_at(8, self.file_count);
        fixed.write_u32_le_at(12, self.alignment);
        fixed.into_vec()
    }

    /// Offset width selected by the version bytes.
    pub fn offset_width(&self) -> OffsetWidth {
        OffsetWidth::from_version(self.version)
    }

    /// Bytes taken by the cue id and offset tables.
    pub fn tables_size(&self) -> u64 {
        tables_size(self.file_count as u64, self.offset_width())
    }
}

fn tables_size(file_count: u64, width: OffsetWidth) -> u64 {
    CUE_ID_SIZE * file_count + width.bytes() * (file_count + 1)
}

/// Header size and offsets for a set of entry sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Afs2Layout {
    /// Offset table width.
    pub width: OffsetWidth,
    /// Payload alignment.
    pub alignment: u32,
    /// Fixed header plus both tables.
    pub header_size: u64,
    /// `file_count + 1` unaligned offsets; the last one is the end of data.
    pub offsets: Vec<u64>,
}

impl Afs2Layout {
    /// Aligned start of entry `index`'s payload.
    pub fn payload_offset(&self, index: usize) -> u64 {
        align_up(self.offsets[index], self.alignment.into())
    }

    /// Total archive size.
    pub fn total_size(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(self.header_size)
    }
}

/// Result of one layout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutAttempt {
    /// Every offset fits the width.
    Fits(Afs2Layout),
    /// Some offset reached the width's limit.
    Overflow,
}

/// Compute the layout for `sizes` at a fixed width.
///
/// `offset[0]` is the header size and `offset[i + 1]` is the aligned start of
/// entry `i` plus its size.
pub fn plan_layout(width: OffsetWidth, sizes: &[u64], alignment: u32) -> LayoutAttempt {
    let header_size = FIXED_HEADER_SIZE + tables_size(sizes.len() as u64, width);
    let limit = width.limit();

    let mut offsets = Vec::with_capacity(sizes.len() + 1);
    let mut position = header_size;
    if position >= limit {
        return LayoutAttempt::Overflow;
    }
    offsets.push(position);

    for &size in sizes {
        position = align_up(position, alignment.into()) + size;
        if position >= limit {
            return LayoutAttempt::Overflow;
        }
        offsets.push(position);
    }

    LayoutAttempt::Fits(Afs2Layout {
        width,
        alignment,
        header_size,
        offsets,
    })
}

/// Compute the layout, widening to 32-bit offsets once if 16 bits overflow.
pub fn negotiate_layout(preferred: OffsetWidth, sizes: &[u64], alignment: u32) -> Result<Afs2Layout> {
    if let LayoutAttempt::Fits(layout) = plan_layout(preferred, sizes, alignment) {
        return Ok(layout);
    }

    if preferred == OffsetWidth::Narrow {
        debug!(
            entries = sizes.len(),
            "16-bit AFS2 offsets overflow, retrying with 32-bit offsets"
        );
        if let LayoutAttempt::Fits(layout) = plan_layout(OffsetWidth::Wide, sizes, alignment) {
            return Ok(layout);
        }
    }

    Err(CriArcError::unsupported(
        "AFS2 archive larger than the 32-bit offset range",
    ))
}
