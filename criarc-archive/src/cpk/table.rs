//! Table codec contract used by CPK sections.
//!
//! CPK headers and index sections are serialized row/column tables. The
//! container only needs to read and write named cells, so it talks to the
//! table format through [`TableCodec`].

use criarc_core::error::Result;
use std::fmt;

/// Column value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Unsigned 8-bit.
    U8,
    /// Signed 8-bit.
    I8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    I16,
    /// Unsigned 32-bit.
    U32,
    /// Signed 32-bit.
    I32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 64-bit.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// String from the string pool.
    String,
    /// Byte blob from the data pool.
    Data,
}

impl ColumnKind {
    /// Zero value of this kind.
    pub fn zero(self) -> TableValue {
        match self {
            Self::U8 => TableValue::U8(0),
            Self::I8 => TableValue::I8(0),
            Self::U16 => TableValue::U16(0),
            Self::I16 => TableValue::I16(0),
            Self::U32 => TableValue::U32(0),
            Self::I32 => TableValue::I32(0),
            Self::U64 => TableValue::U64(0),
            Self::I64 => TableValue::I64(0),
            Self::F32 => TableValue::F32(0.0),
            Self::F64 => TableValue::F64(0.0),
            Self::String => TableValue::String(String::new()),
            Self::Data => TableValue::Data(Vec::new()),
        }
    }

    /// Check if this kind holds an integer.
    pub fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64 | Self::String | Self::Data)
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum TableValue {
    /// Unsigned 8-bit.
    U8(u8),
    /// Signed 8-bit.
    I8(i8),
    /// Unsigned 16-bit.
    U16(u16),
    /// Signed 16-bit.
    I16(i16),
    /// Unsigned 32-bit.
    U32(u32),
    /// Signed 32-bit.
    I32(i32),
    /// Unsigned 64-bit.
    U64(u64),
    /// Signed 64-bit.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// String.
    String(String),
    /// Byte blob.
    Data(Vec<u8>),
}

impl TableValue {
    /// Kind of this value.
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::U8(_) => ColumnKind::U8,
            Self::I8(_) => ColumnKind::I8,
            Self::U16(_) => ColumnKind::U16,
            Self::I16(_) => ColumnKind::I16,
            Self::U32(_) => ColumnKind::U32,
            Self::I32(_) => ColumnKind::I32,
            Self::U64(_) => ColumnKind::U64,
            Self::I64(_) => ColumnKind::I64,
            Self::F32(_) => ColumnKind::F32,
            Self::F64(_) => ColumnKind::F64,
            Self::String(_) => ColumnKind::String,
            Self::Data(_) => ColumnKind::Data,
        }
    }

    /// Integer value widened to `i128`.
    fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Self::U8(v) => v.into(),
            Self::I8(v) => v.into(),
            Self::U16(v) => v.into(),
            Self::I16(v) => v.into(),
            Self::U32(v) => v.into(),
            Self::I32(v) => v.into(),
            Self::U64(v) => v.into(),
            Self::I64(v) => v.into(),
            _ => return None,
        })
    }

    /// Non-negative integer value.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    /// String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Blob value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Convert to `kind`, allowing integer conversions that keep the value.
    pub fn coerce(self, kind: ColumnKind) -> Option<Self> {
        if self.kind() == kind {
            return Some(self);
        }
        if !kind.is_integer() {
            return None;
        }
        let v = self.as_i128()?;
        Some(match kind {
            ColumnKind::U8 => Self::U8(v.try_into().ok()?),
            ColumnKind::I8 => Self::I8(v.try_into().ok()?),
            ColumnKind::U16 => Self::U16(v.try_into().ok()?),
            ColumnKind::I16 => Self::I16(v.try_into().ok()?),
            ColumnKind::U32 => Self::U32(v.try_into().ok()?),
            ColumnKind::I32 => Self::I32(v.try_into().ok()?),
            ColumnKind::U64 => Self::U64(v.try_into().ok()?),
            ColumnKind::I64 => Self::I64(v.try_into().ok()?),
            _ => return None,
        })
    }
}

impl fmt::Display for TableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Data(d) => write!(f, "<{} bytes>", d.len()),
        }
    }
}

/// A serializable row/column table.
pub trait TableCodec: Sized + Clone + fmt::Debug {
    /// Signature of an unmasked blob.
    const SIGNATURE: [u8; 4];

    /// Parse a blob.
    fn load(bytes: &[u8]) -> Result<Self>;

    /// Serialize to a blob.
    fn save(&self) -> Result<Vec<u8>>;

    /// Table name.
    fn table_name(&self) -> &str;

    /// Number of rows.
    fn row_count(&self) -> usize;

    /// Column names in order.
    fn column_names(&self) -> Vec<&str>;

    /// Cell at `name`/`row`, if both exist.
    fn get_column(&self, name: &str, row: usize) -> Option<&TableValue>;

    /// Store a cell. Returns `false` if the column or row does not exist or
    /// the value cannot be represented by the column's kind.
    fn set_column(&mut self, name: &str, row: usize, value: TableValue) -> bool;

    /// Create an empty table with the given columns.
    fn with_schema(name: &str, columns: &[(&str, ColumnKind)]) -> Self;

    /// Append a row of zero values and return its index.
    fn push_row(&mut self) -> usize;

    /// Check if the table has a column.
    fn has_column(&self, name: &str) -> bool {
        self.column_names().contains(&name)
    }

    /// Integer cell.
    fn get_u64(&self, name: &str, row: usize) -> Option<u64> {
        self.get_column(name, row).and_then(TableValue::as_u64)
    }

    /// String cell.
    fn get_str(&self, name: &str, row: usize) -> Option<&str> {
        self.get_column(name, row).and_then(TableValue::as_str)
    }

    /// Parse a blob cell as a nested table; empty or missing cells give `None`.
    fn get_nested(&self, name: &str, row: usize) -> Result<Option<Self>> {
        match self.get_column(name, row).and_then(TableValue::as_bytes) {
            Some(bytes) if !bytes.is_empty() => Self::load(bytes).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integers() {
        assert_eq!(
            TableValue::U64(300).coerce(ColumnKind::U16),
            Some(TableValue::U16(300))
        );
        assert_eq!(TableValue::U64(300).coerce(ColumnKind::U8), None);
        assert_eq!(TableValue::I32(-1).coerce(ColumnKind::U32), None);
        assert_eq!(
            TableValue::I32(-1).coerce(ColumnKind::I64),
            Some(TableValue::I64(-1))
        );
        assert_eq!(TableValue::U8(1).coerce(ColumnKind::String), None);
        assert_eq!(TableValue::F32(1.0).coerce(ColumnKind::U32), None);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(TableValue::I16(7).as_u64(), Some(7));
        assert_eq!(TableValue::I16(-7).as_u64(), None);
        assert_eq!(TableValue::String("a".into()).as_str(), Some("a"));
        assert_eq!(TableValue::Data(vec![1]).as_bytes(), Some(&[1u8][..]));
        assert_eq!(ColumnKind::Data.zero(), TableValue::Data(Vec::new()));
    }
}
