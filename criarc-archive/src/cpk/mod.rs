//! CPK file package support.
//!
//! A CPK starts with a header section whose table locates the index sections:
//!
//! - `TOC `: one row per file with directory, name, offset and both sizes
//! - `ITOC`: files addressed by numeric id only
//! - `ETOC`: per-file extra data, carried through unchanged until entries
//!   are added or removed
//!
//! Payload starts at 0x800, right after the "(c)CRI" tag at 0x7FA. Entries
//! whose stored size differs from their extract size are CRILAYLA frames.
//!
//! ## Example
//!
//! ```rust
//! use criarc_archive::cpk::{CpkArchive, DEFAULT_ALIGN, IndexLayout};
//! use criarc_core::traits::ArchiveReader;
//! use std::io::Cursor;
//!
//! let mut archive = CpkArchive::new(DEFAULT_ALIGN, IndexLayout::Toc);
//! archive.push_memory("data", "hello.txt", b"Hello, CPK!".to_vec());
//!
//! let mut bytes = Vec::new();
//! archive.save(&mut bytes).unwrap();
//! assert_eq!(&bytes[0x7FA..0x800], b"(c)CRI");
//!
//! let mut loaded: CpkArchive<_> = CpkArchive::open(Cursor::new(bytes)).unwrap();
//! assert_eq!(loaded.entry(0).unwrap().path(), "data/hello.txt");
//! assert_eq!(loaded.extract(0).unwrap(), b"Hello, CPK!");
//! ```

mod section;
pub mod table;
pub mod utf;

pub use section::{DEFAULT_SECTION_FLAG, SECTION_HEADER_SIZE, Section, mask_in_place};
pub use table::{ColumnKind, TableCodec, TableValue};
pub use utf::{Storage, UTF_SIGNATURE, UtfTable};

use crate::write_zeros;
use criarc_core::align_up;
use criarc_core::entry::{EntryData, EntryInfo};
use criarc_core::error::{CriArcError, Result};
use criarc_core::source::SourceHandle;
use criarc_core::traits::{ArchiveReader, ArchiveWriter};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use tracing::{debug, trace, warn};

/// "CPK " read as a little-endian `u32`.
pub const CPK_SIGNATURE: u32 = 0x204B_5043;

/// File offset of the first payload byte.
pub const CONTENT_START: u64 = 0x800;

/// Default payload and section alignment.
pub const DEFAULT_ALIGN: u32 = 0x800;

const COPYRIGHT_OFFSET: u64 = 0x7FA;
const COPYRIGHT: &[u8; 6] = b"(c)CRI";

const HEADER_SIG: [u8; 4] = *b"CPK ";
const TOC_SIG: [u8; 4] = *b"TOC ";
const ITOC_SIG: [u8; 4] = *b"ITOC";
const ETOC_SIG: [u8; 4] = *b"ETOC";

/// Largest size stored in the 16-bit ITOC table.
const ITOC_SMALL_LIMIT: u64 = 0xFFFF;

const HEADER_COLUMNS: &[(&str, ColumnKind)] = &[
    ("UpdateDateTime", ColumnKind::U64),
    ("ContentOffset", ColumnKind::U64),
    ("ContentSize", ColumnKind::U64),
    ("TocOffset", ColumnKind::U64),
    ("TocSize", ColumnKind::U64),
    ("EtocOffset", ColumnKind::U64),
    ("EtocSize", ColumnKind::U64),
    ("ItocOffset", ColumnKind::U64),
    ("ItocSize", ColumnKind::U64),
    ("EnabledPackedSize", ColumnKind::U64),
    ("EnabledDataSize", ColumnKind::U64),
    ("Files", ColumnKind::U32),
    ("Version", ColumnKind::U16),
    ("Revision", ColumnKind::U16),
    ("Align", ColumnKind::U16),
    ("Sorted", ColumnKind::U16),
    ("CpkMode", ColumnKind::U32),
    ("Codec", ColumnKind::U32),
    ("Tvers", ColumnKind::String),
];

const TOC_COLUMNS: &[(&str, ColumnKind)] = &[
    ("DirName", ColumnKind::String),
    ("FileName", ColumnKind::String),
    ("FileSize", ColumnKind::U32),
    ("ExtractSize", ColumnKind::U32),
    ("FileOffset", ColumnKind::U64),
    ("ID", ColumnKind::U32),
    ("UserString", ColumnKind::String),
];

const ITOC_COLUMNS: &[(&str, ColumnKind)] = &[
    ("FilesL", ColumnKind::U32),
    ("FilesH", ColumnKind::U32),
    ("DataL", ColumnKind::Data),
    ("DataH", ColumnKind::Data),
];

const ITOC_L_COLUMNS: &[(&str, ColumnKind)] = &[
    ("ID", ColumnKind::U16),
    ("FileSize", ColumnKind::U16),
    ("ExtractSize", ColumnKind::U16),
];

const ITOC_H_COLUMNS: &[(&str, ColumnKind)] = &[
    ("ID", ColumnKind::U16),
    ("FileSize", ColumnKind::U32),
    ("ExtractSize", ColumnKind::U32),
];

/// Which index sections an archive carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLayout {
    /// Named files only.
    Toc,
    /// Numbered files only.
    Itoc,
    /// Named files with an id index.
    TocItoc,
}

impl IndexLayout {
    /// Value of the `CpkMode` header column.
    pub fn cpk_mode(self) -> u32 {
        match self {
            Self::Itoc => 0,
            Self::Toc => 1,
            Self::TocItoc => 2,
        }
    }

    /// Check if a TOC section is written.
    pub fn has_toc(self) -> bool {
        matches!(self, Self::Toc | Self::TocItoc)
    }

    /// Check if an ITOC section is written.
    pub fn has_itoc(self) -> bool {
        matches!(self, Self::Itoc | Self::TocItoc)
    }
}

impl std::fmt::Display for IndexLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Toc => write!(f, "TOC"),
            Self::Itoc => write!(f, "ITOC"),
            Self::TocItoc => write!(f, "TOC+ITOC"),
        }
    }
}

/// Index section an entry was found through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Table of contents.
    Toc,
    /// Id index.
    Itoc,
}

/// One CPK file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpkEntry {
    /// Directory, may be empty.
    pub dir_name: String,
    /// File name.
    pub file_name: String,
    /// Numeric id.
    pub id: u32,
    /// Free-form user string.
    pub user_string: String,
    /// Where the stored bytes live.
    pub data: EntryData,
    /// Logical size after decompression.
    pub extract_size: u64,
    /// Stored size of a compressed entry, 0 if stored verbatim.
    pub compressed_size: u64,
    /// Index section the entry came from.
    pub origin: EntryOrigin,
}

impl CpkEntry {
    /// `dir/name`, or just the name when there is no directory.
    pub fn path(&self) -> String {
        if self.dir_name.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.dir_name, self.file_name)
        }
    }

    /// Check if the stored bytes are a CRILAYLA frame.
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != 0
    }

    fn logical_size(&self, stored: u64) -> u64 {
        if self.is_compressed() {
            self.extract_size
        } else {
            stored
        }
    }
}

/// CPK archive reader and writer.
///
/// Generic over the table format used for its sections; [`UtfTable`] is the
/// format found in real archives.
#[derive(Debug)]
pub struct CpkArchive<R = File, T = UtfTable> {
    header: Section<T>,
    toc: Option<Section<T>>,
    itoc: Option<Section<T>>,
    etoc: Option<Section<T>>,
    layout: IndexLayout,
    align: u32,
    entries: Vec<CpkEntry>,
    source: Option<SourceHandle<R>>,
    structure_changed: bool,
}

impl<R, T: TableCodec> Default for CpkArchive<R, T> {
    fn default() -> Self {
        Self::with_layout(DEFAULT_ALIGN, IndexLayout::Toc)
    }
}

impl CpkArchive {
    /// Create an empty archive.
    pub fn new(align: u32, layout: IndexLayout) -> Self {
        Self::with_layout(align, layout)
    }
}

fn set_cell<T: TableCodec>(table: &mut T, name: &str, row: usize, value: TableValue) -> Result<()> {
    if table.set_column(name, row, value) {
        Ok(())
    } else {
        Err(CriArcError::invalid_header(format!(
            "cannot store {name} in {} row {row}",
            table.table_name()
        )))
    }
}

impl<R, T: TableCodec> CpkArchive<R, T> {
    /// Create an empty archive using table format `T`.
    pub fn with_layout(align: u32, layout: IndexLayout) -> Self {
        let mut header = T::with_schema("CpkHeader", HEADER_COLUMNS);
        let row = header.push_row();
        header.set_column("Version", row, TableValue::U16(7));
        header.set_column("Revision", row, TableValue::U16(0));
        header.set_column("Sorted", row, TableValue::U16(1));
        header.set_column("Tvers", row, TableValue::String(env!("CARGO_PKG_NAME").into()));

        Self {
            header: Section::new(HEADER_SIG, header),
            toc: None,
            itoc: None,
            etoc: None,
            layout,
            align,
            entries: Vec::new(),
            source: None,
            structure_changed: true,
        }
    }

    /// Index sections written on save.
    pub fn layout(&self) -> IndexLayout {
        self.layout
    }

    /// Payload and section alignment.
    pub fn align(&self) -> u32 {
        self.align
    }

    /// Header section.
    pub fn header(&self) -> &Section<T> {
        &self.header
    }

    /// TOC section, if loaded or already saved.
    pub fn toc(&self) -> Option<&Section<T>> {
        self.toc.as_ref()
    }

    /// ITOC section, if loaded or already saved.
    pub fn itoc(&self) -> Option<&Section<T>> {
        self.itoc.as_ref()
    }

    /// ETOC section, if loaded.
    pub fn etoc(&self) -> Option<&Section<T>> {
        self.etoc.as_ref()
    }

    /// Mask every section's table on save.
    pub fn set_masked(&mut self, masked: bool) {
        self.header.set_masked(masked);
        for section in [&mut self.toc, &mut self.itoc, &mut self.etoc].into_iter().flatten() {
            section.set_masked(masked);
        }
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
    pub fn entry(&self, index: usize) -> Option<&CpkEntry> {
        self.entries.get(index)
    }

    /// Index of the entry whose path or file name is `name`.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.path() == name)
            .or_else(|| self.entries.iter().position(|e| e.file_name == name))
    }

    fn next_id(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.id.wrapping_add(1))
            .max()
            .unwrap_or(0)
    }

    fn default_origin(&self) -> EntryOrigin {
        if self.layout.has_toc() {
            EntryOrigin::Toc
        } else {
            EntryOrigin::Itoc
        }
    }

    /// Append an entry and return its index.
    pub fn push_entry(&mut self, entry: CpkEntry) -> usize {
        self.entries.push(entry);
        self.structure_changed = true;
        self.entries.len() - 1
    }

    /// Append an in-memory file and return its index.
    pub fn push_memory(
        &mut self,
        dir_name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> usize {
        let entry = CpkEntry {
            dir_name: dir_name.into(),
            file_name: file_name.into(),
            id: self.next_id(),
            user_string: String::new(),
            extract_size: bytes.len() as u64,
            compressed_size: 0,
            data: EntryData::Memory(bytes),
            origin: self.default_origin(),
        };
        self.push_entry(entry)
    }

    /// Append a file read from `path` at save time and return its index.
    pub fn push_external(
        &mut self,
        dir_name: impl Into<String>,
        file_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<usize> {
        let data = EntryData::External(path.into());
        let entry = CpkEntry {
            dir_name: dir_name.into(),
            file_name: file_name.into(),
            id: self.next_id(),
            user_string: String::new(),
            extract_size: data.stored_size()?,
            compressed_size: 0,
            data,
            origin: self.default_origin(),
        };
        Ok(self.push_entry(entry))
    }

    /// Remove entry `index`.
    pub fn remove(&mut self, index: usize) -> Result<CpkEntry> {
        if index >= self.entries.len() {
            return Err(CriArcError::entry_not_found(format!("#{index}")));
        }
        self.structure_changed = true;
        Ok(self.entries.remove(index))
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut CpkEntry> {
        self.entries
            .get_mut(index)
            .ok_or_else(|| CriArcError::entry_not_found(format!("#{index}")))
    }

    /// Replace entry `index` with uncompressed owned bytes.
    pub fn replace_memory(&mut self, index: usize, bytes: Vec<u8>) -> Result<()> {
        let entry = self.entry_mut(index)?;
        entry.extract_size = bytes.len() as u64;
        entry.compressed_size = 0;
        entry.data = EntryData::Memory(bytes);
        Ok(())
    }

    /// Replace entry `index` with an uncompressed file on disk.
    pub fn replace_external(&mut self, index: usize, path: impl Into<PathBuf>) -> Result<()> {
        let data = EntryData::External(path.into());
        let size = data.stored_size()?;
        let entry = self.entry_mut(index)?;
        entry.extract_size = size;
        entry.compressed_size = 0;
        entry.data = data;
        Ok(())
    }
}

impl<R: Read + Seek, T: TableCodec> CpkArchive<R, T> {
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
        let header = Section::<T>::read(&mut source, 0, HEADER_SIG)?;
        let table = header.table();
        if table.row_count() == 0 {
            return Err(CriArcError::invalid_header("CPK header table has no rows"));
        }

        let codec = table.get_u64("Codec", 0).unwrap_or(0);
        if codec != 0 {
            return Err(CriArcError::unsupported(format!("CPK codec {codec}")));
        }
        if table.get_u64("GtocOffset", 0).unwrap_or(0) != 0 {
            return Err(CriArcError::unsupported("CPK GTOC section"));
        }

        let content_offset = table.get_u64("ContentOffset", 0).unwrap_or(CONTENT_START);
        let toc_offset = table.get_u64("TocOffset", 0).unwrap_or(0);
        let itoc_offset = table.get_u64("ItocOffset", 0).unwrap_or(0);
        let etoc_offset = table.get_u64("EtocOffset", 0).unwrap_or(0);
        let align = table
            .get_u64("Align", 0)
            .and_then(|a| u32::try_from(a).ok())
            .unwrap_or(DEFAULT_ALIGN);

        debug!(
            content_offset,
            toc_offset,
            itoc_offset,
            etoc_offset,
            align,
            masked = header.is_masked(),
            "read CPK header"
        );

        let toc = match toc_offset {
            0 => None,
            offset => Some(Section::<T>::read(&mut source, offset, TOC_SIG)?),
        };
        let itoc = match itoc_offset {
            0 => None,
            offset => Some(Section::<T>::read(&mut source, offset, ITOC_SIG)?),
        };
        let etoc = match etoc_offset {
            0 => None,
            offset => Some(Section::<T>::read(&mut source, offset, ETOC_SIG)?),
        };

        let layout = match (&toc, &itoc) {
            (Some(_), Some(_)) => IndexLayout::TocItoc,
            (None, Some(_)) => IndexLayout::Itoc,
            _ => IndexLayout::Toc,
        };

        let entries = if let Some(toc) = &toc {
            toc_entries(toc.table(), content_offset.min(toc_offset), source.len())?
        } else if let Some(itoc) = &itoc {
            itoc_entries(itoc.table(), content_offset, align, source.len())?
        } else {
            Vec::new()
        };

        debug!(entries = entries.len(), %layout, "read CPK index");

        Ok(Self {
            header,
            toc,
            itoc,
            etoc,
            layout,
            align,
            entries,
            source: Some(source),
            structure_changed: false,
        })
    }

    /// Read entry `index`, decompressing it if needed.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| CriArcError::entry_not_found(format!("#{index}")))?;

        if !entry.is_compressed() {
            return entry.data.read_all(self.source.as_mut());
        }
        if entry.origin == EntryOrigin::Itoc {
            return Err(CriArcError::unsupported(format!(
                "compressed ITOC entry {} ({} stored, {} extracted)",
                entry.id, entry.compressed_size, entry.extract_size
            )));
        }

        let stored = entry.data.read_all(self.source.as_mut())?;
        trace!(index, stored = stored.len(), extract_size = entry.extract_size, "CRILAYLA entry");
        criarc_crilayla::decompress(&stored, entry.extract_size)
    }

    /// Write the archive to `writer`.
    pub fn save<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        let sizes = self
            .entries
            .iter()
            .map(|e| e.data.stored_size())
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        if self.layout == IndexLayout::Itoc {
            order.sort_by_key(|&i| self.entries[i].id);
        }

        let align = u64::from(self.align);
        let mut starts = vec![0u64; self.entries.len()];
        let mut position = CONTENT_START;
        for &index in &order {
            let start = align_up(position, align);
            starts[index] = start;
            position = start + sizes[index];
        }
        let content_end = position;

        let toc = if self.layout.has_toc() {
            Some(self.build_toc(&sizes, &starts)?)
        } else {
            None
        };
        let itoc = if self.layout.has_itoc() {
            Some(self.build_itoc(&sizes)?)
        } else {
            None
        };
        let etoc = if self.structure_changed && self.etoc.is_some() {
            warn!("dropping ETOC section after adding or removing entries");
            None
        } else {
            self.etoc.clone()
        };

        let mut placed = Vec::new();
        let mut position = content_end;
        let mut locate = |section: &Option<Section<T>>| -> Result<(u64, u64)> {
            let Some(section) = section else {
                return Ok((0, 0));
            };
            let bytes = section.to_bytes()?;
            let offset = align_up(position, align);
            let size = bytes.len() as u64;
            position = offset + size;
            placed.push((offset, bytes));
            Ok((offset, size))
        };
        let (toc_offset, toc_size) = locate(&toc)?;
        let (itoc_offset, itoc_size) = locate(&itoc)?;
        let (etoc_offset, etoc_size) = locate(&etoc)?;
        let total = position;

        let packed: u64 = sizes.iter().sum();
        let extracted: u64 = self
            .entries
            .iter()
            .zip(&sizes)
            .map(|(e, &s)| e.logical_size(s))
            .sum();

        let header = self.header.table_mut();
        let mut locating = |name: &str, value: u64, required: bool| {
            let stored = header.set_column(name, 0, TableValue::U64(value));
            if required {
                assert!(stored, "CPK header cannot hold {name} = {value:#x}");
            }
        };
        locating("ContentOffset", CONTENT_START, true);
        locating("ContentSize", content_end - CONTENT_START, false);
        locating("TocOffset", toc_offset, toc.is_some());
        locating("TocSize", toc_size, false);
        locating("ItocOffset", itoc_offset, itoc.is_some());
        locating("ItocSize", itoc_size, false);
        locating("EtocOffset", etoc_offset, etoc.is_some());
        locating("EtocSize", etoc_size, false);
        locating("Files", self.entries.len() as u64, false);
        locating("EnabledPackedSize", packed, false);
        locating("EnabledDataSize", extracted, false);
        locating("Align", align, false);
        locating("CpkMode", u64::from(self.layout.cpk_mode()), false);

        let header_bytes = self.header.to_bytes()?;
        if header_bytes.len() as u64 > COPYRIGHT_OFFSET {
            return Err(CriArcError::unsupported(format!(
                "CPK header of {} bytes does not fit before {COPYRIGHT_OFFSET:#x}",
                header_bytes.len()
            )));
        }

        writer.write_all(&header_bytes)?;
        write_zeros(writer, COPYRIGHT_OFFSET - header_bytes.len() as u64)?;
        writer.write_all(COPYRIGHT)?;

        let mut written = CONTENT_START;
        for &index in &order {
            let start = starts[index];
            write_zeros(writer, start - written)?;
            let copied = self.entries[index].data.copy_to(self.source.as_mut(), writer)?;
            if copied != sizes[index] {
                return Err(CriArcError::size_mismatch(sizes[index], copied));
            }
            written = start + copied;
        }
        for (offset, bytes) in &placed {
            write_zeros(writer, offset - written)?;
            writer.write_all(bytes)?;
            written = offset + bytes.len() as u64;
        }
        debug_assert_eq!(written, total);

        debug!(
            entries = self.entries.len(),
            layout = %self.layout,
            toc_offset,
            itoc_offset,
            etoc_offset,
            size = total,
            "wrote CPK archive"
        );

        self.toc = toc;
        self.itoc = itoc;
        self.etoc = etoc;
        self.structure_changed = false;
        Ok(total)
    }

    fn build_toc(&self, sizes: &[u64], starts: &[u64]) -> Result<Section<T>> {
        let mut section = match (&self.toc, self.structure_changed) {
            (Some(toc), false) => toc.clone(),
            (Some(toc), true) => toc.with_table(T::with_schema("CpkTocInfo", TOC_COLUMNS)),
            (None, _) => {
                let mut section = Section::new(TOC_SIG, T::with_schema("CpkTocInfo", TOC_COLUMNS));
                section.set_masked(self.header.is_masked());
                section
            }
        };
        let rebuild = self.structure_changed || self.toc.is_none();
        let table = section.table_mut();

        for (row, entry) in self.entries.iter().enumerate() {
            if rebuild {
                table.push_row();
                set_cell(table, "DirName", row, TableValue::String(entry.dir_name.clone()))?;
                set_cell(table, "FileName", row, TableValue::String(entry.file_name.clone()))?;
                set_cell(table, "ID", row, TableValue::U32(entry.id))?;
                set_cell(table, "UserString", row, TableValue::String(entry.user_string.clone()))?;
            }
            set_cell(table, "FileSize", row, TableValue::U64(sizes[row]))?;
            set_cell(table, "ExtractSize", row, TableValue::U64(entry.logical_size(sizes[row])))?;
            set_cell(table, "FileOffset", row, TableValue::U64(starts[row] - CONTENT_START))?;
        }
        Ok(section)
    }

    fn build_itoc(&self, sizes: &[u64]) -> Result<Section<T>> {
        let mut small = T::with_schema("CpkItocL", ITOC_L_COLUMNS);
        let mut large = T::with_schema("CpkItocH", ITOC_H_COLUMNS);

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| self.entries[i].id);
        for index in order {
            let entry = &self.entries[index];
            let stored = sizes[index];
            let logical = entry.logical_size(stored);
            let table = if stored <= ITOC_SMALL_LIMIT && logical <= ITOC_SMALL_LIMIT {
                &mut small
            } else {
                &mut large
            };
            let row = table.push_row();
            set_cell(table, "ID", row, TableValue::U32(entry.id))?;
            set_cell(table, "FileSize", row, TableValue::U64(stored))?;
            set_cell(table, "ExtractSize", row, TableValue::U64(logical))?;
        }

        let mut info = T::with_schema("CpkItocInfo", ITOC_COLUMNS);
        info.push_row();
        set_cell(&mut info, "FilesL", 0, TableValue::U64(small.row_count() as u64))?;
        set_cell(&mut info, "FilesH", 0, TableValue::U64(large.row_count() as u64))?;
        set_cell(&mut info, "DataL", 0, TableValue::Data(small.save()?))?;
        set_cell(&mut info, "DataH", 0, TableValue::Data(large.save()?))?;

        Ok(match &self.itoc {
            Some(itoc) => itoc.with_table(info),
            None => {
                let mut section = Section::new(ITOC_SIG, info);
                section.set_masked(self.header.is_masked());
                section
            }
        })
    }
}

fn toc_entries<T: TableCodec>(toc: &T, base: u64, source_len: u64) -> Result<Vec<CpkEntry>> {
    let mut entries = Vec::with_capacity(toc.row_count());
    for row in 0..toc.row_count() {
        let required = |name: &str| {
            toc.get_u64(name, row).ok_or_else(|| {
                CriArcError::invalid_header(format!("CPK TOC row {row} has no {name}"))
            })
        };
        let file_size = required("FileSize")?;
        let extract_size = toc.get_u64("ExtractSize", row).unwrap_or(file_size);
        let file_offset = required("FileOffset")?;
        let offset = base.checked_add(file_offset).ok_or_else(|| {
            CriArcError::truncated(base, file_offset, source_len.saturating_sub(base))
        })?;
        check_range(offset, file_size, source_len)?;

        let entry = CpkEntry {
            dir_name: toc.get_str("DirName", row).unwrap_or_default().to_owned(),
            file_name: toc.get_str("FileName", row).unwrap_or_default().to_owned(),
            id: toc
                .get_u64("ID", row)
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or(row as u32),
            user_string: toc.get_str("UserString", row).unwrap_or_default().to_owned(),
            data: EntryData::Internal {
                offset,
                size: file_size,
            },
            extract_size,
            compressed_size: if file_size != extract_size { file_size } else { 0 },
            origin: EntryOrigin::Toc,
        };
        trace!(row, path = %entry.path(), offset, file_size, extract_size, "CPK TOC entry");
        entries.push(entry);
    }
    Ok(entries)
}

fn itoc_entries<T: TableCodec>(
    itoc: &T,
    content_offset: u64,
    align: u32,
    source_len: u64,
) -> Result<Vec<CpkEntry>> {
    let mut rows = Vec::new();
    for name in ["DataL", "DataH"] {
        let Some(table) = itoc.get_nested(name, 0)? else {
            continue;
        };
        for row in 0..table.row_count() {
            let field = |column: &str| {
                table.get_u64(column, row).ok_or_else(|| {
                    CriArcError::invalid_header(format!("CPK ITOC {name} row {row} has no {column}"))
                })
            };
            let id = u32::try_from(field("ID")?)
                .map_err(|_| CriArcError::invalid_header("CPK ITOC id out of range"))?;
            rows.push((id, field("FileSize")?, field("ExtractSize")?));
        }
    }
    rows.sort_by_key(|&(id, _, _)| id);

    check_range(content_offset, 0, source_len)?;
    let mut entries = Vec::with_capacity(rows.len());
    let mut position = content_offset;
    for (id, file_size, extract_size) in rows {
        let offset = align_up(position, align.into());
        check_range(offset, file_size, source_len)?;
        position = offset + file_size;
        entries.push(CpkEntry {
            dir_name: String::new(),
            file_name: format!("{id:05}.bin"),
            id,
            user_string: String::new(),
            data: EntryData::Internal {
                offset,
                size: file_size,
            },
            extract_size,
            compressed_size: if file_size != extract_size { file_size } else { 0 },
            origin: EntryOrigin::Itoc,
        });
    }
    Ok(entries)
}

fn check_range(offset: u64, size: u64, source_len: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= source_len => Ok(()),
        _ => Err(CriArcError::truncated(
            offset,
            size,
            source_len.saturating_sub(offset),
        )),
    }
}

impl<R: Read + Seek, T: TableCodec> ArchiveReader for CpkArchive<R, T> {
    fn entries(&mut self) -> Result<Vec<EntryInfo>> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let stored_size = entry.data.stored_size()?;
                Ok(EntryInfo {
                    index,
                    name: entry.path(),
                    size: entry.logical_size(stored_size),
                    stored_size,
                })
            })
            .collect()
    }

    fn extract(&mut self, index: usize) -> Result<Vec<u8>> {
        self.read_entry(index)
    }

    fn extract_to<W: Write>(&mut self, index: usize, writer: &mut W) -> Result<u64> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| CriArcError::entry_not_found(format!("#{index}")))?;
        if entry.is_compressed() {
            let bytes = self.read_entry(index)?;
            writer.write_all(&bytes)?;
            return Ok(bytes.len() as u64);
        }
        entry.data.copy_to(self.source.as_mut(), writer)
    }
}

impl<R: Read + Seek, T: TableCodec> ArchiveWriter for CpkArchive<R, T> {
    fn save<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        CpkArchive::save(self, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    type MemoryCpk = CpkArchive<Cursor<Vec<u8>>>;

    fn saved<R: Read + Seek>(archive: &mut CpkArchive<R>) -> Vec<u8> {
        let mut bytes = Vec::new();
        archive.save(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_toc_layout_bytes() {
        let mut archive = CpkArchive::new(0x20, IndexLayout::Toc);
        archive.push_memory("", "a.bin", vec![0xAA; 5]);
        archive.push_memory("snd", "b.bin", vec![0xBB; 3]);
        let bytes = saved(&mut archive);

        assert_eq!(&bytes[..4], &CPK_SIGNATURE.to_le_bytes());
        assert_eq!(&bytes[0x7FA..0x800], b"(c)CRI");
        assert_eq!(&bytes[0x800..0x805], &[0xAA; 5]);
        assert_eq!(&bytes[0x820..0x823], &[0xBB; 3]);
        assert_eq!(&bytes[0x840..0x844], b"TOC ");

        let header = archive.header().table();
        assert_eq!(header.get_u64("TocOffset", 0), Some(0x840));
        assert_eq!(header.get_u64("ContentSize", 0), Some(0x23));
        assert_eq!(header.get_u64("Files", 0), Some(2));
        assert_eq!(header.get_u64("ItocOffset", 0), Some(0));
        assert_eq!(
            header.get_u64("TocSize", 0),
            Some(bytes.len() as u64 - 0x840)
        );
    }

    #[test]
    fn test_toc_round_trip() {
        let mut archive = CpkArchive::new(DEFAULT_ALIGN, IndexLayout::Toc);
        archive.push_memory("data", "one.txt", b"first".to_vec());
        archive.push_memory("", "two.txt", b"second".to_vec());
        let bytes = saved(&mut archive);

        let mut loaded = MemoryCpk::open(Cursor::new(bytes.clone())).unwrap();
        assert_eq!(loaded.layout(), IndexLayout::Toc);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.find_by_name("data/one.txt"), Some(0));
        assert_eq!(loaded.find_by_name("two.txt"), Some(1));
        assert_eq!(loaded.read_entry(0).unwrap(), b"first");
        assert_eq!(loaded.read_entry(1).unwrap(), b"second");
        assert_eq!(
            loaded.entry(1).unwrap().data,
            EntryData::Internal { offset: 0x1000, size: 6 }
        );

        // unchanged structure re-saves to identical bytes
        assert_eq!(saved(&mut loaded), bytes);
    }

    #[test]
    fn test_itoc_round_trip() {
        let mut archive = CpkArchive::new(0x10, IndexLayout::Itoc);
        archive.push_memory("", "", vec![1; 3]);
        archive.push_memory("", "", vec![2; 0x10010]);
        let bytes = saved(&mut archive);
        assert!(archive.toc().is_none());

        let mut loaded = MemoryCpk::open(Cursor::new(bytes)).unwrap();
        assert_eq!(loaded.layout(), IndexLayout::Itoc);
        assert_eq!(loaded.entry(0).unwrap().file_name, "00000.bin");
        assert_eq!(loaded.entry(1).unwrap().file_name, "00001.bin");
        assert_eq!(loaded.entry(1).unwrap().origin, EntryOrigin::Itoc);
        assert_eq!(loaded.read_entry(0).unwrap(), vec![1; 3]);
        assert_eq!(loaded.read_entry(1).unwrap().len(), 0x10010);

        let itoc = loaded.itoc().unwrap().table();
        assert_eq!(itoc.get_u64("FilesL", 0), Some(1));
        assert_eq!(itoc.get_u64("FilesH", 0), Some(1));
    }

    #[test]
    fn test_toc_itoc_layout() {
        let mut archive = CpkArchive::new(0x20, IndexLayout::TocItoc);
        archive.push_memory("", "x", vec![7; 4]);
        let bytes = saved(&mut archive);

        let loaded = MemoryCpk::open(Cursor::new(bytes)).unwrap();
        assert_eq!(loaded.layout(), IndexLayout::TocItoc);
        assert_eq!(loaded.header().table().get_u64("CpkMode", 0), Some(2));
        assert_eq!(loaded.entry(0).unwrap().origin, EntryOrigin::Toc);
    }

    #[test]
    fn test_compressed_itoc_entry_is_unsupported() {
        let mut archive = MemoryCpk::with_layout(DEFAULT_ALIGN, IndexLayout::Itoc);
        archive.push_entry(CpkEntry {
            dir_name: String::new(),
            file_name: "00000.bin".into(),
            id: 0,
            user_string: String::new(),
            data: EntryData::Memory(vec![0; 3]),
            extract_size: 10,
            compressed_size: 3,
            origin: EntryOrigin::Itoc,
        });
        assert!(archive.read_entry(0).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_gtoc_is_unsupported() {
        let mut table = UtfTable::with_schema("CpkHeader", &[("GtocOffset", ColumnKind::U64)]);
        let row = table.push_row();
        table.set_column("GtocOffset", row, TableValue::U64(0x900));
        let bytes = Section::new(HEADER_SIG, table).to_bytes().unwrap();

        let err = MemoryCpk::open(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_load_failure_resets() {
        let mut archive = CpkArchive::new(0x20, IndexLayout::Toc);
        archive.push_memory("", "a", vec![1; 8]);
        let mut bytes = saved(&mut archive);
        bytes.truncate(0x804);

        let mut target = MemoryCpk::with_layout(0x40, IndexLayout::Itoc);
        target.push_memory("", "keep", vec![0]);
        assert!(target.load(Cursor::new(bytes)).is_err());
        assert!(target.is_empty());
        assert_eq!(target.align(), DEFAULT_ALIGN);
        assert_eq!(target.layout(), IndexLayout::Toc);
    }

    /// Header at 0 and one index section at `CONTENT_START`.
    fn crafted(cells: &[(&str, u64)], signature: [u8; 4], index: UtfTable) -> Vec<u8> {
        let mut header = UtfTable::with_schema("CpkHeader", HEADER_COLUMNS);
        let row = header.push_row();
        for &(name, value) in cells {
            assert!(header.set_column(name, row, TableValue::U64(value)));
        }
        let mut bytes = Section::new(HEADER_SIG, header).to_bytes().unwrap();
        bytes.resize(CONTENT_START as usize, 0);
        bytes.extend_from_slice(&Section::new(signature, index).to_bytes().unwrap());
        bytes
    }

    #[test]
    fn test_toc_offset_overflow_is_rejected() {
        let mut toc = UtfTable::with_schema("CpkTocInfo", TOC_COLUMNS);
        let row = toc.push_row();
        toc.set_column("FileName", row, TableValue::String("a.bin".into()));
        toc.set_column("FileSize", row, TableValue::U64(1));
        toc.set_column("ExtractSize", row, TableValue::U64(1));
        toc.set_column("FileOffset", row, TableValue::U64(u64::MAX - 0x10));
        let bytes = crafted(
            &[("ContentOffset", CONTENT_START), ("TocOffset", CONTENT_START)],
            TOC_SIG,
            toc,
        );

        let mut target = MemoryCpk::with_layout(0x40, IndexLayout::Itoc);
        target.push_memory("", "keep", vec![0]);
        let err = target.load(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_truncated());
        assert!(target.is_empty());
    }

    #[test]
    fn test_itoc_content_offset_past_end_is_rejected() {
        let mut data = UtfTable::with_schema("CpkItocL", ITOC_L_COLUMNS);
        let row = data.push_row();
        data.set_column("FileSize", row, TableValue::U64(1));
        data.set_column("ExtractSize", row, TableValue::U64(1));
        let mut itoc = UtfTable::with_schema("CpkItocInfo", ITOC_COLUMNS);
        itoc.push_row();
        itoc.set_column("FilesL", 0, TableValue::U64(1));
        itoc.set_column("DataL", 0, TableValue::Data(data.save().unwrap()));
        let bytes = crafted(
            &[("ContentOffset", u64::MAX), ("ItocOffset", CONTENT_START), ("Align", 0x800)],
            ITOC_SIG,
            itoc,
        );

        let err = MemoryCpk::open(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_structure_change_rebuilds_toc() {
        let mut archive = CpkArchive::new(0x20, IndexLayout::Toc);
        archive.push_memory("", "a", vec![1; 4]);
        archive.push_memory("", "b", vec![2; 4]);
        let bytes = saved(&mut archive);

        let mut loaded = MemoryCpk::open(Cursor::new(bytes)).unwrap();
        loaded.remove(0).unwrap();
        loaded.replace_memory(0, vec![9; 6]).unwrap();
        let bytes = saved(&mut loaded);

        let mut reloaded = MemoryCpk::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.entry(0).unwrap().file_name, "b");
        assert_eq!(reloaded.read_entry(0).unwrap(), vec![9; 6]);
    }
}
