//! CPK section framing and table masking.
//!
//! Every CPK section (the file header and the TOC / ITOC / ETOC indexes) has
//! the same 16-byte frame around a serialized table:
//!
//! ```text
//! 0x00  signature  "CPK ", "TOC ", "ITOC" or "ETOC"
//! 0x04  flag       u32 LE, opaque
//! 0x08  size       u64 LE, table blob length
//! 0x10  table blob, optionally masked
//! ```

use super::table::TableCodec;
use criarc_core::arena::ByteArena;
use criarc_core::error::{CriArcError, Result};
use criarc_core::source::SourceHandle;
use std::io::{Read, Seek};
use tracing::debug;

/// Size of the section frame before the table blob.
pub const SECTION_HEADER_SIZE: u64 = 0x10;

/// Flag written for sections created from scratch.
pub const DEFAULT_SECTION_FLAG: u32 = 0xFF;

const MASK_SEED: u32 = 0x655F;
const MASK_MULTIPLIER: u32 = 0x4115;

/// Apply the table mask to `bytes`.
///
/// The key stream only depends on the byte position, so masking twice
/// restores the input.
pub fn mask_in_place(bytes: &mut [u8]) {
    let mut state = MASK_SEED;
    for byte in bytes {
        *byte ^= state as u8;
        state = state.wrapping_mul(MASK_MULTIPLIER);
    }
}

/// A framed table.
#[derive(Debug, Clone)]
pub struct Section<T> {
    signature: [u8; 4],
    flag: u32,
    table: T,
    masked: bool,
}

impl<T: TableCodec> Section<T> {
    /// Wrap a table in an unmasked section.
    pub fn new(signature: [u8; 4], table: T) -> Self {
        Self {
            signature,
            flag: DEFAULT_SECTION_FLAG,
            table,
            masked: false,
        }
    }

    /// Same framing as `self` around a different table.
    pub fn with_table(&self, table: T) -> Self {
        Self {
            signature: self.signature,
            flag: self.flag,
            table,
            masked: self.masked,
        }
    }

    /// Read the section at `offset`, unmasking the blob if needed.
    pub fn read<R: Read + Seek>(
        source: &mut SourceHandle<R>,
        offset: u64,
        signature: [u8; 4],
    ) -> Result<Self> {
        let frame = ByteArena::from(source.read_vec_at(offset, SECTION_HEADER_SIZE)?);
        let found = frame.read_bytes_at(0, 4)?;
        if found != signature {
            return Err(CriArcError::invalid_magic(signature.to_vec(), found.to_vec()));
        }
        let flag = frame.read_u32_le_at(4)?;
        let size = frame.read_u64_le_at(8)?;

        let mut blob = source.read_vec_at(offset + SECTION_HEADER_SIZE, size)?;
        let masked = blob.get(..4) != Some(&T::SIGNATURE[..]);
        if masked {
            mask_in_place(&mut blob);
        }
        debug!(
            section = %String::from_utf8_lossy(&signature),
            offset,
            size,
            masked,
            "read CPK section"
        );

        let table = T::load(&blob)?;
        Ok(Self {
            signature,
            flag,
            table,
            masked,
        })
    }

    /// Serialize frame and blob, re-masking if the section was masked.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut blob = self.table.save()?;
        if self.masked {
            mask_in_place(&mut blob);
        }
        let mut frame = ByteArena::with_capacity(SECTION_HEADER_SIZE as usize + blob.len());
        frame.push_bytes(&self.signature);
        frame.write_u32_le_at(4, self.flag);
        frame.write_u64_le_at(8, blob.len() as u64);
        frame.push_bytes(&blob);
        Ok(frame.into_vec())
    }

    /// Section signature.
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }

    /// Opaque flag.
    pub fn flag(&self) -> u32 {
        self.flag
    }

    /// Check if the blob is stored masked.
    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Choose whether the blob is masked on save.
    pub fn set_masked(&mut self, masked: bool) {
        self.masked = masked;
    }

    /// The table.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// The table, mutably.
    pub fn table_mut(&mut self) -> &mut T {
        &mut self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpk::table::{ColumnKind, TableValue};
    use crate::cpk::utf::UtfTable;
    use std::io::Cursor;

    fn table() -> UtfTable {
        let mut table = UtfTable::with_schema("CpkTocInfo", &[("FileName", ColumnKind::String)]);
        let row = table.push_row();
        table.set_column("FileName", row, TableValue::String("a.bin".into()));
        table
    }

    #[test]
    fn test_mask_key_stream() {
        let mut bytes = [0u8; 2];
        mask_in_place(&mut bytes);
        let second = MASK_SEED.wrapping_mul(MASK_MULTIPLIER) as u8;
        assert_eq!(bytes, [0x5F, second]);

        let mut text = *b"@UTF and more";
        mask_in_place(&mut text);
        assert_ne!(&text, b"@UTF and more");
        mask_in_place(&mut text);
        assert_eq!(&text, b"@UTF and more");
    }

    #[test]
    fn test_plain_section_round_trip() {
        let section = Section::new(*b"TOC ", table());
        let bytes = section.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"TOC ");
        assert_eq!(&bytes[0x10..0x14], b"@UTF");

        let mut source = SourceHandle::new(Cursor::new(bytes)).unwrap();
        let loaded = Section::<UtfTable>::read(&mut source, 0, *b"TOC ").unwrap();
        assert!(!loaded.is_masked());
        assert_eq!(loaded.flag(), DEFAULT_SECTION_FLAG);
        assert_eq!(loaded.table().get_str("FileName", 0), Some("a.bin"));
    }

    #[test]
    fn test_masked_section_round_trip() {
        let mut section = Section::new(*b"ITOC", table());
        section.set_masked(true);
        let bytes = section.to_bytes().unwrap();
        assert_ne!(&bytes[0x10..0x14], b"@UTF");

        let mut source = SourceHandle::new(Cursor::new(bytes.clone())).unwrap();
        let loaded = Section::<UtfTable>::read(&mut source, 0, *b"ITOC").unwrap();
        assert!(loaded.is_masked());
        assert_eq!(loaded.table().get_str("FileName", 0), Some("a.bin"));
        assert_eq!(loaded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_wrong_signature() {
        let bytes = Section::new(*b"ETOC", table()).to_bytes().unwrap();
        let mut source = SourceHandle::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            Section::<UtfTable>::read(&mut source, 0, *b"TOC "),
            Err(CriArcError::InvalidMagic { .. })
        ));
    }
}
