//! AFS2 (AWB) wave bank support.
//!
//! An AFS2 archive is a flat list of unnamed payloads behind a cue id table
//! and an offset table. Payloads are aligned individually; the offset table is
//! 16 or 32 bits wide depending on the version bytes, and saving widens it
//! automatically when the 16-bit range overflows.
//!
//! ## Example
//!
//! ```rust
//! use criarc_archive::afs2::Afs2Archive;
//! use std::io::Cursor;
//!
//! let mut archive = Afs2Archive::new();
//! archive.push_memory(b"HCA\0 first".to_vec());
//! archive.push_memory(vec![0x80, 0x00, 0x00, 0x20]);
//!
//! let mut bytes = Vec::new();
//! archive.save(&mut bytes).unwrap();
//!
//! let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
//! assert_eq!(loaded.choose_file_name(0).unwrap(), "0001.hca");
//! assert_eq!(loaded.choose_file_name(1).unwrap(), "0002.adx");
//! ```

mod header;

pub use header::{
    AFS2_SIGNATURE, Afs2Header, Afs2Layout, DEFAULT_ALIGNMENT, DEFAULT_VERSION, FIXED_HEADER_SIZE,
    LayoutAttempt, OffsetWidth, negotiate_layout, plan_layout,
};

use crate::write_zeros;
use criarc_core::align_up;
use criarc_core::arena::ByteArena;
use criarc_core::entry::{EntryData, EntryInfo};
use criarc_core::error::{CriArcError, Result};
use criarc_core::source::SourceHandle;
use criarc_core::traits::{ArchiveReader, ArchiveWriter};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use tracing::{debug, trace};

/// HCA signature ("HCA\0"), compared after masking the high bits.
const HCA_SIGNATURE: u32 = 0x0041_4348;

/// ADX files start with 0x80 0x00.
const ADX_SIGNATURE: u32 = 0x0080;

/// One AFS2 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Afs2Entry {
    /// Cue id read from the index table.
    pub cue_id: u16,
    /// Where the payload lives.
    pub data: EntryData,
}

/// AFS2 archive reader and writer.
///
/// Loaded entries refer to the archive stream, which stays open for the
/// lifetime of the archive.
#[derive(Debug)]
pub struct Afs2Archive<R = File> {
    version: [u8; 4],
    alignment: u32,
    entries: Vec<Afs2Entry>,
    source: Option<SourceHandle<R>>,
}

impl<R> Default for Afs2Archive<R> {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            alignment: DEFAULT_ALIGNMENT,
            entries: Vec::new(),
            source: None,
        }
    }
}

impl Afs2Archive {
    /// Create an empty archive with default version and alignment.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R> Afs2Archive<R> {
    /// Builder method to set the payload alignment.
    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    /// Builder method to set the version bytes.
    pub fn with_version(mut self, version: [u8; 4]) -> Self {
        self.version = version;
        self
    }

    /// Version bytes.
    pub fn version(&self) -> [u8; 4] {
        self.version
    }

    /// Payload alignment.
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Offset width selected by the current version bytes.
    pub fn offset_width(&self) -> OffsetWidth {
        OffsetWidth::from_version(self.version)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry.
    pub fn entry(&self, index: usize) -> Option<&Afs2Entry> {
        self.entries.get(index)
    }

    fn next_cue_id(&self) -> u16 {
        self.entries
            .iter()
            .map(|e| e.cue_id.wrapping_add(1))
            .max()
            .unwrap_or(0)
    }

    fn push(&mut self, data: EntryData) -> usize {
        let cue_id = self.next_cue_id();
        self.entries.push(Afs2Entry { cue_id, data });
        self.entries.len() - 1
    }

    /// Append an in-memory payload and return its index.
    pub fn push_memory(&mut self, bytes: Vec<u8>) -> usize {
        self.push(EntryData::Memory(bytes))
    }

    /// Append a payload read from `path` at save time.
    pub fn push_external(&mut self, path: impl Into<PathBuf>) -> usize {
        self.push(EntryData::External(path.into()))
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut Afs2Entry> {
        self.entries
            .get_mut(index)
            .ok_or_else(|| CriArcError::entry_not_found(format!("#{index}")))
    }

    /// Replace the payload of entry `index` with owned bytes.
    pub fn replace_memory(&mut self, index: usize, bytes: Vec<u8>) -> Result<()> {
        self.entry_mut(index)?.data = EntryData::Memory(bytes);
        Ok(())
    }

    /// Replace the payload of entry `index` with a file on disk.
    pub fn replace_external(&mut self, index: usize, path: impl Into<PathBuf>) -> Result<()> {
        self.entry_mut(index)?.data = EntryData::External(path.into());
        Ok(())
    }

    /// Remove entry `index`.
    pub fn remove(&mut self, index: usize) -> Result<Afs2Entry> {
        if index >= self.entries.len() {
            return Err(CriArcError::entry_not_found(format!("#{index}")));
        }
        Ok(self.entries.remove(index))
    }

    /// Compute the layout `save` would write.
    pub fn layout(&self) -> Result<Afs2Layout> {
        let sizes = self
            .entries
            .iter()
            .map(|e| e.data.stored_size())
            .collect::<Result<Vec<_>>>()?;
        negotiate_layout(self.offset_width(), &sizes, self.alignment)
    }
}

impl<R: Read + Seek> Afs2Archive<R> {
    /// Open an archive from a stream.
    pub fn open(reader: R) -> Result<Self> {
        let mut archive = Self::default();
        archive.load(reader)?;
        Ok(archive)
    }

    /// Replace the contents with the archive in `reader`.
    ///
    /// On failure the archive is reset to its empty default state.
    pub fn load(&mut self, reader: R) -> Result<()> {
        match Self::read_archive(reader) {
            Ok(archive) => {
                *self = archive;
                Ok(())
            }
            Err(e) => {
                *self = Self::default();
                Err(e)
            }
        }
    }

    fn read_archive(reader: R) -> Result<Self> {
        let mut source = SourceHandle::new(reader)?;

        let header = Afs2Header::parse(&source.read_vec_at(0, FIXED_HEADER_SIZE)?)?;
        let width = header.offset_width();
        let count = header.file_count as usize;

        debug!(
            version = ?header.version,
            file_count = header.file_count,
            alignment = header.alignment,
            %width,
            "read AFS2 header"
        );

        let tables = ByteArena::from(source.read_vec_at(FIXED_HEADER_SIZE, header.tables_size())?);
        let cue_ids = (0..count)
            .map(|i| tables.read_u16_le_at(i * 2))
            .collect::<Result<Vec<u16>>>()?;
        let offsets_at = count * 2;
        let offsets = (0..=count)
            .map(|i| match width {
                OffsetWidth::Narrow => tables.read_u16_le_at(offsets_at + i * 2).map(u64::from),
                OffsetWidth::Wide => tables.read_u32_le_at(offsets_at + i * 4).map(u64::from),
            })
            .collect::<Result<Vec<u64>>>()?;

        let mut entries = Vec::with_capacity(count);
        for (i, &cue_id) in cue_ids.iter().enumerate() {
            let start = align_up(offsets[i], header.alignment.into());
            let end = offsets[i + 1];
            if end < start {
                return Err(CriArcError::invalid_header(format!(
                    "AFS2 entry {i} ends at {end:#x} before its aligned start {start:#x}"
                )));
            }
            if end > source.len() {
                return Err(CriArcError::truncated(
                    start,
                    end - start,
                    source.len().saturating_sub(start),
                ));
            }
            trace!(index = i, cue_id, start, size = end - start, "AFS2 entry");
            entries.push(Afs2Entry {
                cue_id,
                data: EntryData::Internal {
                    offset: start,
                    size: end - start,
                },
            });
        }

        Ok(Self {
            version: header.version,
            alignment: header.alignment,
            entries,
            source: Some(source),
        })
    }

    /// Read the payload of entry `index`.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| CriArcError::entry_not_found(format!("#{index}")))?;
        entry.data.read_all(self.source.as_mut())
    }

    /// Infer a file name for entry `index` from its first bytes.
    ///
    /// HCA and ADX payloads get their extension; everything else falls back
    /// to `.bin`. Names are the 1-based index padded to four digits.
    pub fn choose_file_name(&mut self, index: usize) -> Result<String> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| CriArcError::entry_not_found(format!("#{index}")))?;
        let prefix = entry.data.read_prefix(self.source.as_mut(), 4)?;
        Ok(format!("{:04}{}", index + 1, extension_for(&prefix)))
    }

    /// Find the index of the entry whose inferred name is `name`.
    pub fn find_by_name(&mut self, name: &str) -> Result<Option<usize>> {
        for index in 0..self.entries.len() {
            if self.choose_file_name(index)? == name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Write the archive to `writer`.
    ///
    /// The offset width is renegotiated from the current entry sizes; if the
    /// 16-bit table overflows, the version bytes are switched to the 32-bit
    /// variant once the write has succeeded.
    pub fn save<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        let layout = self.layout()?;
        let mut version = self.version;
        if layout.width != self.offset_width() {
            version[1] = layout.width.version_tag();
        }

        let count = self.entries.len();
        let header = Afs2Header {
            version,
            file_count: count as u32,
            alignment: self.alignment,
        };
        let mut head = ByteArena::from(header.to_bytes());
        let ids_at = FIXED_HEADER_SIZE as usize;
        for index in 0..count {
            head.write_u16_le_at(ids_at + index * 2, index as u16);
        }
        let offsets_at = ids_at + count * 2;
        for (i, &offset) in layout.offsets.iter().enumerate() {
            match layout.width {
                OffsetWidth::Narrow => head.write_u16_le_at(offsets_at + i * 2, offset as u16),
                OffsetWidth::Wide => head.write_u32_le_at(offsets_at + i * 4, offset as u32),
            }
        }
        writer.write_all(head.as_slice())?;

        let mut position = layout.header_size;
        for (index, entry) in self.entries.iter().enumerate() {
            let start = layout.payload_offset(index);
            write_zeros(writer, start - position)?;
            let written = entry.data.copy_to(self.source.as_mut(), writer)?;
            let expected = layout.offsets[index + 1] - start;
            if written != expected {
                return Err(CriArcError::size_mismatch(expected, written));
            }
            position = start + written;
        }
        self.version = version;

        debug!(
            entries = self.entries.len(),
            width = %layout.width,
            size = position,
            "wrote AFS2 archive"
        );
        Ok(position)
    }
}

/// Extension for a payload starting with `prefix`.
fn extension_for(prefix: &[u8]) -> &'static str {
    let Ok(raw) = <[u8; 4]>::try_from(prefix) else {
        return ".bin";
    };
    let signature = u32::from_le_bytes(raw);
    if signature & 0x7F7F_7F7F == HCA_SIGNATURE {
        ".hca"
    } else if signature & 0xFFFF == ADX_SIGNATURE {
        ".adx"
    } else {
        ".bin"
    }
}

impl<R: Read + Seek> ArchiveReader for Afs2Archive<R> {
    fn entries(&mut self) -> Result<Vec<EntryInfo>> {
        let mut infos = Vec::with_capacity(self.entries.len());
        for index in 0..self.entries.len() {
            let name = self.choose_file_name(index)?;
            let size = self.entries[index].data.stored_size()?;
            infos.push(EntryInfo {
                index,
                name,
                size,
                stored_size: size,
            });
        }
        Ok(infos)
    }

    fn extract(&mut self, index: usize) -> Result<Vec<u8>> {
        self.read_entry(index)
    }

    fn extract_to<W: Write>(&mut self, index: usize, writer: &mut W) -> Result<u64> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| CriArcError::entry_not_found(format!("#{index}")))?;
        entry.data.copy_to(self.source.as_mut(), writer)
    }
}

impl<R: Read + Seek> ArchiveWriter for Afs2Archive<R> {
    fn save<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        Afs2Archive::save(self, writer)
    }
}
