//! @UTF table format.
//!
//! All fields are big-endian. Offsets in the header are relative to byte 8.
//!
//! ```text
//! 0x00  "@UTF"
//! 0x04  u32  table size (bytes after this field)
//! 0x08  u16  version
//! 0x0A  u16  rows offset
//! 0x0C  u32  strings offset
//! 0x10  u32  data offset
//! 0x14  u32  table name (string pool offset)
//! 0x18  u16  column count
//! 0x1A  u16  row width
//! 0x1C  u32  row count
//! 0x20  columns: u8 flags, u32 name, [constant value]
//! ```
//!
//! The high nibble of a column's flags is its storage class (zero, constant or
//! per-row); the low nibble is its [`ColumnKind`].

use super::table::{ColumnKind, TableCodec, TableValue};
use criarc_core::align_up;
use criarc_core::arena::ByteArena;
use criarc_core::error::{CriArcError, Result};
use encoding_rs::SHIFT_JIS;
use std::collections::HashMap;

/// "@UTF".
pub const UTF_SIGNATURE: [u8; 4] = *b"@UTF";

const HEADER_SIZE: usize = 0x20;
const OFFSET_BASE: usize = 8;
const NULL_STRING: &str = "<NULL>";

const STORAGE_MASK: u8 = 0xF0;
const TYPE_MASK: u8 = 0x0F;
const STORAGE_ZERO: u8 = 0x10;
const STORAGE_CONSTANT: u8 = 0x30;
const STORAGE_PER_ROW: u8 = 0x50;

/// How a column's values are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Every row holds the kind's zero value; nothing is stored.
    Zero,
    /// One value in the column descriptor shared by every row.
    Constant,
    /// One value per row.
    PerRow,
}

impl Storage {
    fn from_flags(flags: u8) -> Result<Self> {
        match flags & STORAGE_MASK {
            STORAGE_ZERO => Ok(Self::Zero),
            STORAGE_CONSTANT => Ok(Self::Constant),
            STORAGE_PER_ROW => Ok(Self::PerRow),
            other => Err(CriArcError::invalid_header(format!(
                "unknown @UTF column storage {other:#04x}"
            ))),
        }
    }

    fn flags(self) -> u8 {
        match self {
            Self::Zero => STORAGE_ZERO,
            Self::Constant => STORAGE_CONSTANT,
            Self::PerRow => STORAGE_PER_ROW,
        }
    }
}

fn kind_from_code(code: u8) -> Result<ColumnKind> {
    Ok(match code {
        0x0 => ColumnKind::U8,
        0x1 => ColumnKind::I8,
        0x2 => ColumnKind::U16,
        0x3 => ColumnKind::I16,
        0x4 => ColumnKind::U32,
        0x5 => ColumnKind::I32,
        0x6 => ColumnKind::U64,
        0x7 => ColumnKind::I64,
        0x8 => ColumnKind::F32,
        0x9 => ColumnKind::F64,
        0xA => ColumnKind::String,
        0xB => ColumnKind::Data,
        other => {
            return Err(CriArcError::invalid_header(format!(
                "unknown @UTF column type {other:#x}"
            )));
        }
    })
}

fn kind_code(kind: ColumnKind) -> u8 {
    match kind {
        ColumnKind::U8 => 0x0,
        ColumnKind::I8 => 0x1,
        ColumnKind::U16 => 0x2,
        ColumnKind::I16 => 0x3,
        ColumnKind::U32 => 0x4,
        ColumnKind::I32 => 0x5,
        ColumnKind::U64 => 0x6,
        ColumnKind::I64 => 0x7,
        ColumnKind::F32 => 0x8,
        ColumnKind::F64 => 0x9,
        ColumnKind::String => 0xA,
        ColumnKind::Data => 0xB,
    }
}

fn value_size(kind: ColumnKind) -> usize {
    match kind {
        ColumnKind::U8 | ColumnKind::I8 => 1,
        ColumnKind::U16 | ColumnKind::I16 => 2,
        ColumnKind::U32 | ColumnKind::I32 | ColumnKind::F32 | ColumnKind::String => 4,
        ColumnKind::U64 | ColumnKind::I64 | ColumnKind::F64 | ColumnKind::Data => 8,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    kind: ColumnKind,
    storage: Storage,
    /// Shared value for zero and constant columns.
    shared: TableValue,
}

/// An @UTF table.
#[derive(Debug, Clone, PartialEq)]
pub struct UtfTable {
    name: String,
    version: u16,
    shift_jis: bool,
    columns: Vec<Column>,
    rows: Vec<Vec<TableValue>>,
}

/// Read-side view of the pools.
struct Pools<'a> {
    arena: &'a ByteArena,
    strings: usize,
    data: usize,
    shift_jis: bool,
}

impl Pools<'_> {
    fn string(&mut self, offset: u32) -> Result<String> {
        let start = self.strings + offset as usize;
        let bytes = self.arena.as_slice();
        if start >= bytes.len() {
            return Err(CriArcError::truncated(start as u64, 1, 0));
        }
        let end = bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .ok_or_else(|| CriArcError::invalid_header("unterminated @UTF string"))?;
        let raw = &bytes[start..end];

        if let Ok(s) = std::str::from_utf8(raw) {
            return Ok(s.to_owned());
        }
        let (decoded, _, had_errors) = SHIFT_JIS.decode(raw);
        if !had_errors {
            self.shift_jis = true;
            return Ok(decoded.into_owned());
        }
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    fn data(&self, offset: u32, size: u32) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .arena
            .read_bytes_at(self.data + offset as usize, size as usize)?
            .to_vec())
    }

    fn value(&mut self, kind: ColumnKind, at: usize) -> Result<TableValue> {
        let a = self.arena;
        Ok(match kind {
            ColumnKind::U8 => TableValue::U8(a.read_u8_at(at)?),
            ColumnKind::I8 => TableValue::I8(a.read_u8_at(at)? as i8),
            ColumnKind::U16 => TableValue::U16(a.read_u16_be_at(at)?),
            ColumnKind::I16 => TableValue::I16(a.read_u16_be_at(at)? as i16),
            ColumnKind::U32 => TableValue::U32(a.read_u32_be_at(at)?),
            ColumnKind::I32 => TableValue::I32(a.read_u32_be_at(at)? as i32),
            ColumnKind::U64 => TableValue::U64(a.read_u64_be_at(at)?),
            ColumnKind::I64 => TableValue::I64(a.read_u64_be_at(at)? as i64),
            ColumnKind::F32 => TableValue::F32(f32::from_bits(a.read_u32_be_at(at)?)),
            ColumnKind::F64 => TableValue::F64(f64::from_bits(a.read_u64_be_at(at)?)),
            ColumnKind::String => TableValue::String(self.string(a.read_u32_be_at(at)?)?),
            ColumnKind::Data => {
                let offset = a.read_u32_be_at(at)?;
                let size = a.read_u32_be_at(at + 4)?;
                TableValue::Data(self.data(offset, size)?)
            }
        })
    }
}

/// Write-side pools.
struct PoolBuilder {
    strings: Vec<u8>,
    string_offsets: HashMap<String, u32>,
    data: Vec<u8>,
    shift_jis: bool,
}

impl PoolBuilder {
    fn new(shift_jis: bool) -> Self {
        let mut pools = Self {
            strings: Vec::new(),
            string_offsets: HashMap::new(),
            data: Vec::new(),
            shift_jis,
        };
        pools.intern(NULL_STRING);
        pools
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.string_offsets.get(s) {
            return offset;
        }
        let offset = self.strings.len() as u32;
        if self.shift_jis {
            let (encoded, _, _) = SHIFT_JIS.encode(s);
            self.strings.extend_from_slice(&encoded);
        } else {
            self.strings.extend_from_slice(s.as_bytes());
        }
        self.strings.push(0);
        self.string_offsets.insert(s.to_owned(), offset);
        offset
    }

    fn push_data(&mut self, bytes: &[u8]) -> (u32, u32) {
        if bytes.is_empty() {
            return (0, 0);
        }
        let padded = self.data.len().next_multiple_of(8);
        self.data.resize(padded, 0);
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        (offset, bytes.len() as u32)
    }

    fn encode(&mut self, value: &TableValue, out: &mut Vec<u8>) {
        match value {
            TableValue::U8(v) => out.push(*v),
            TableValue::I8(v) => out.push(*v as u8),
            TableValue::U16(v) => out.extend_from_slice(&v.to_be_bytes()),
            TableValue::I16(v) => out.extend_from_slice(&v.to_be_bytes()),
            TableValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
            TableValue::I32(v) => out.extend_from_slice(&v.to_be_bytes()),
            TableValue::U64(v) => out.extend_from_slice(&v.to_be_bytes()),
            TableValue::I64(v) => out.extend_from_slice(&v.to_be_bytes()),
            TableValue::F32(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            TableValue::F64(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            TableValue::String(s) => {
                let offset = self.intern(s);
                out.extend_from_slice(&offset.to_be_bytes());
            }
            TableValue::Data(d) => {
                let (offset, size) = self.push_data(d);
                out.extend_from_slice(&offset.to_be_bytes());
                out.extend_from_slice(&size.to_be_bytes());
            }
        }
    }
}

impl UtfTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Storage class of a column.
    pub fn storage(&self, name: &str) -> Option<Storage> {
        self.column_index(name).map(|i| self.columns[i].storage)
    }

    /// Kind of a column.
    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.column_index(name).map(|i| self.columns[i].kind)
    }

    /// Check if strings are stored as Shift_JIS.
    pub fn is_shift_jis(&self) -> bool {
        self.shift_jis
    }

    fn row_width(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| c.storage == Storage::PerRow)
            .map(|c| value_size(c.kind))
            .sum()
    }
}

impl TableCodec for UtfTable {
    const SIGNATURE: [u8; 4] = UTF_SIGNATURE;

    fn load(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CriArcError::truncated(0, HEADER_SIZE as u64, bytes.len() as u64));
        }
        if bytes[..4] != UTF_SIGNATURE {
            return Err(CriArcError::invalid_magic(UTF_SIGNATURE.to_vec(), bytes[..4].to_vec()));
        }

        let head = ByteArena::from(bytes[..HEADER_SIZE].to_vec());
        let table_size = head.read_u32_be_at(4)? as usize + OFFSET_BASE;
        if table_size > bytes.len() {
            return Err(CriArcError::truncated(
                0,
                table_size as u64,
                bytes.len() as u64,
            ));
        }
        let arena = ByteArena::from(bytes[..table_size].to_vec());

        let version = arena.read_u16_be_at(0x08)?;
        let rows_start = arena.read_u16_be_at(0x0A)? as usize + OFFSET_BASE;
        let strings_start = arena.read_u32_be_at(0x0C)? as usize + OFFSET_BASE;
        let data_start = arena.read_u32_be_at(0x10)? as usize + OFFSET_BASE;
        let name_offset = arena.read_u32_be_at(0x14)?;
        let column_count = arena.read_u16_be_at(0x18)? as usize;
        let row_width = arena.read_u16_be_at(0x1A)? as usize;
        let row_count = arena.read_u32_be_at(0x1C)? as usize;

        let mut pools = Pools {
            arena: &arena,
            strings: strings_start,
            data: data_start,
            shift_jis: false,
        };
        let name = pools.string(name_offset)?;

        let mut columns = Vec::with_capacity(column_count.min(0x1000));
        let mut at = HEADER_SIZE;
        for _ in 0..column_count {
            let flags = arena.read_u8_at(at)?;
            let storage = Storage::from_flags(flags)?;
            let kind = kind_from_code(flags & TYPE_MASK)?;
            let column_name = pools.string(arena.read_u32_be_at(at + 1)?)?;
            at += 5;

            let shared = match storage {
                Storage::Constant => {
                    let value = pools.value(kind, at)?;
                    at += value_size(kind);
                    value
                }
                _ => kind.zero(),
            };
            columns.push(Column {
                name: column_name,
                kind,
                storage,
                shared,
            });
        }

        let needed: usize = columns
            .iter()
            .filter(|c| c.storage == Storage::PerRow)
            .map(|c| value_size(c.kind))
            .sum();
        if row_width < needed {
            return Err(CriArcError::invalid_header(format!(
                "@UTF row width {row_width} is below the {needed} bytes its columns need"
            )));
        }
        let rows_end = row_count
            .checked_mul(row_width)
            .and_then(|size| size.checked_add(rows_start));
        match rows_end {
            Some(end) if end <= strings_start => {}
            _ => {
                return Err(CriArcError::truncated(
                    rows_start as u64,
                    (row_count as u64).saturating_mul(row_width as u64),
                    strings_start.saturating_sub(rows_start) as u64,
                ));
            }
        }
        // rows without stored values still cannot outnumber the table's bytes
        if row_width == 0 && row_count > table_size {
            return Err(CriArcError::invalid_header(format!(
                "@UTF table of {table_size} bytes claims {row_count} rows"
            )));
        }

        let mut rows = Vec::with_capacity(row_count.min(0x10000));
        for row in 0..row_count {
            let mut at = rows_start + row * row_width;
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                if column.storage == Storage::PerRow {
                    values.push(pools.value(column.kind, at)?);
                    at += value_size(column.kind);
                } else {
                    values.push(column.shared.clone());
                }
            }
            rows.push(values);
        }

        let shift_jis = pools.shift_jis;
        Ok(Self {
            name,
            version,
            shift_jis,
            columns,
            rows,
        })
    }

    fn save(&self) -> Result<Vec<u8>> {
        let mut pools = PoolBuilder::new(self.shift_jis);
        let name_offset = pools.intern(&self.name);

        let mut column_bytes = Vec::new();
        for column in &self.columns {
            column_bytes.push(column.storage.flags() | kind_code(column.kind));
            let offset = pools.intern(&column.name);
            column_bytes.extend_from_slice(&offset.to_be_bytes());
            if column.storage == Storage::Constant {
                pools.encode(&column.shared, &mut column_bytes);
            }
        }

        let row_width = self.row_width();
        let mut row_bytes = Vec::with_capacity(row_width * self.rows.len());
        for row in &self.rows {
            for (column, value) in self.columns.iter().zip(row) {
                if column.storage == Storage::PerRow {
                    pools.encode(value, &mut row_bytes);
                }
            }
        }

        let rows_start = HEADER_SIZE + column_bytes.len();
        let strings_start = rows_start + row_bytes.len();
        let data_start = align_up((strings_start + pools.strings.len()) as u64, 8) as usize;
        let end = align_up((data_start + pools.data.len()) as u64, 8) as usize;

        if rows_start - OFFSET_BASE > u16::MAX as usize || row_width > u16::MAX as usize {
            return Err(CriArcError::unsupported("@UTF table with more than 64 KiB of columns"));
        }

        let mut arena = ByteArena::with_capacity(end);
        arena.write_bytes_at(0, &UTF_SIGNATURE);
        arena.write_u32_be_at(0x04, (end - OFFSET_BASE) as u32);
        arena.write_u16_be_at(0x08, self.version);
        arena.write_u16_be_at(0x0A, (rows_start - OFFSET_BASE) as u16);
        arena.write_u32_be_at(0x0C, (strings_start - OFFSET_BASE) as u32);
        arena.write_u32_be_at(0x10, (data_start - OFFSET_BASE) as u32);
        arena.write_u32_be_at(0x14, name_offset);
        arena.write_u16_be_at(0x18, self.columns.len() as u16);
        arena.write_u16_be_at(0x1A, row_width as u16);
        arena.write_u32_be_at(0x1C, self.rows.len() as u32);
        arena.write_bytes_at(HEADER_SIZE, &column_bytes);
        arena.write_bytes_at(rows_start, &row_bytes);
        arena.write_bytes_at(strings_start, &pools.strings);
        arena.write_bytes_at(data_start, &pools.data);
        arena.pad_to(8);

        Ok(arena.into_vec())
    }

    fn table_name(&self) -> &str {
        &self.name
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn get_column(&self, name: &str, row: usize) -> Option<&TableValue> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|values| &values[index])
    }

    fn set_column(&mut self, name: &str, row: usize, value: TableValue) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        if row >= self.rows.len() {
            return false;
        }
        let column = &mut self.columns[index];
        let Some(value) = value.coerce(column.kind) else {
            return false;
        };
        if column.storage != Storage::PerRow && value != column.shared {
            column.storage = Storage::PerRow;
        }
        self.rows[row][index] = value;
        true
    }

    fn with_schema(name: &str, columns: &[(&str, ColumnKind)]) -> Self {
        Self {
            name: name.to_owned(),
            version: 1,
            shift_jis: false,
            columns: columns
                .iter()
                .map(|&(name, kind)| Column {
                    name: name.to_owned(),
                    kind,
                    storage: Storage::PerRow,
                    shared: kind.zero(),
                })
                .collect(),
            rows: Vec::new(),
        }
    }

    fn push_row(&mut self) -> usize {
        let row = self.columns.iter().map(|c| c.shared.clone()).collect();
        self.rows.push(row);
        self.rows.len() - 1
    }
}
