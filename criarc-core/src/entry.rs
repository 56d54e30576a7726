//! Container entry model.
//!
//! An entry's payload can live in one of three places:
//!
//! - inside the archive it was loaded from ([`EntryData::Internal`])
//! - in memory, owned by the entry ([`EntryData::Memory`])
//! - in a file on disk, read at save time ([`EntryData::External`])
//!
//! Containers keep an [`EntryData`] per entry and ask it for the bytes when
//! extracting or saving.

use crate::error::{CriArcError, Result};
use crate::source::SourceHandle;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

/// Location of an entry's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryData {
    /// Byte range of the archive the container was loaded from.
    Internal {
        /// Absolute offset in the archive stream.
        offset: u64,
        /// Payload length in bytes.
        size: u64,
    },
    /// Owned bytes.
    Memory(Vec<u8>),
    /// File on disk, read when needed.
    External(PathBuf),
}

impl EntryData {
    /// Number of bytes the payload occupies.
    ///
    /// External files are stat'ed on every call so later edits to the file
    /// are picked up.
    pub fn stored_size(&self) -> Result<u64> {
        match self {
            Self::Internal { size, .. } => Ok(*size),
            Self::Memory(bytes) => Ok(bytes.len() as u64),
            Self::External(path) => Ok(std::fs::metadata(path)?.len()),
        }
    }

    /// Read the whole payload.
    pub fn read_all<R: Read + Seek>(&self, source: Option<&mut SourceHandle<R>>) -> Result<Vec<u8>> {
        match self {
            Self::Internal { offset, size } => detached(source)?.read_vec_at(*offset, *size),
            Self::Memory(bytes) => Ok(bytes.clone()),
            Self::External(path) => Ok(std::fs::read(path)?),
        }
    }

    /// Read at most `n` leading bytes of the payload.
    pub fn read_prefix<R: Read + Seek>(
        &self,
        source: Option<&mut SourceHandle<R>>,
        n: usize,
    ) -> Result<Vec<u8>> {
        match self {
            Self::Internal { offset, size } => {
                let take = (*size).min(n as u64);
                detached(source)?.read_vec_at(*offset, take)
            }
            Self::Memory(bytes) => Ok(bytes[..bytes.len().min(n)].to_vec()),
            Self::External(path) => {
                let mut prefix = Vec::with_capacity(n);
                File::open(path)?.take(n as u64).read_to_end(&mut prefix)?;
                Ok(prefix)
            }
        }
    }

    /// Stream the payload into `writer`, returning the bytes written.
    pub fn copy_to<R: Read + Seek, W: Write + ?Sized>(
        &self,
        source: Option<&mut SourceHandle<R>>,
        writer: &mut W,
    ) -> Result<u64> {
        match self {
            Self::Internal { offset, size } => {
                detached(source)?.copy_range_to(*offset, *size, writer)
            }
            Self::Memory(bytes) => {
                writer.write_all(bytes)?;
                Ok(bytes.len() as u64)
            }
            Self::External(path) => {
                let mut file = File::open(path)?;
                Ok(io::copy(&mut file, writer)?)
            }
        }
    }
}

fn detached<R>(source: Option<&mut SourceHandle<R>>) -> Result<&mut SourceHandle<R>> {
    source.ok_or_else(|| {
        CriArcError::invalid_header("entry refers to an archive stream that is no longer attached")
    })
}

/// Listing record returned by archive readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Position of the entry in the container.
    pub index: usize,
    /// Entry name (may contain `/` separators).
    pub name: String,
    /// Size after decompression.
    pub size: u64,
    /// Size as stored in the container.
    pub stored_size: u64,
}

impl EntryInfo {
    /// Check if the stored payload is compressed.
    pub fn is_compressed(&self) -> bool {
        self.stored_size != self.size
    }

    /// Get the compression ratio (stored/uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.size == 0 {
            1.0
        } else {
            self.stored_size as f64 / self.size as f64
        }
    }

    /// Get a relative path that is safe to join onto an output directory.
    ///
    /// Drops `..`, `.` and root components and replaces NUL bytes.
    pub fn sanitized_name(&self) -> String {
        let mut result = String::new();
        for component in Path::new(&self.name).components() {
            if let Component::Normal(s) = component {
                if !result.is_empty() {
                    result.push('/');
                }
                result.push_str(&s.to_string_lossy().replace('\0', "_"));
            }
        }
        result
    }
}

impl std::fmt::Display for EntryInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>5} {:>10} {:>10} {}",
            self.index, self.size, self.stored_size, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    type NoSource = Option<&'static mut SourceHandle<Cursor<Vec<u8>>>>;

    #[test]
    fn test_memory_payload() {
        let data = EntryData::Memory(b"hello world".to_vec());
        assert_eq!(data.stored_size().unwrap(), 11);
        assert_eq!(data.read_prefix(NoSource::None, 4).unwrap(), b"hell");
        assert_eq!(data.read_prefix(NoSource::None, 40).unwrap(), b"hello world");

        let mut out = Vec::new();
        assert_eq!(data.copy_to(NoSource::None, &mut out).unwrap(), 11);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_internal_payload() {
        let mut source = SourceHandle::new(Cursor::new(b"..payload..".to_vec())).unwrap();
        let data = EntryData::Internal { offset: 2, size: 7 };
        assert_eq!(data.read_all(Some(&mut source)).unwrap(), b"payload");
        assert_eq!(data.read_prefix(Some(&mut source), 3).unwrap(), b"pay");
    }

    #[test]
    fn test_internal_without_source() {
        let data = EntryData::Internal { offset: 0, size: 1 };
        assert!(data.read_all(NoSource::None).is_err());
    }

    #[test]
    fn test_external_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"on disk").unwrap();
        file.flush().unwrap();

        let data = EntryData::External(file.path().to_path_buf());
        assert_eq!(data.stored_size().unwrap(), 7);
        assert_eq!(data.read_all(NoSource::None).unwrap(), b"on disk");

        file.write_all(b"!!").unwrap();
        file.flush().unwrap();
        assert_eq!(data.stored_size().unwrap(), 9);
    }

    #[test]
    fn test_clone_is_deep() {
        let original = EntryData::Memory(vec![1, 2, 3]);
        let mut copy = original.clone();
        if let EntryData::Memory(bytes) = &mut copy {
            bytes[0] = 9;
        }
        assert_eq!(original, EntryData::Memory(vec![1, 2, 3]));
    }

    #[test]
    fn test_sanitized_name() {
        let info = EntryInfo {
            index: 0,
            name: "../../etc/./passwd".to_string(),
            size: 1,
            stored_size: 1,
        };
        assert_eq!(info.sanitized_name(), "etc/passwd");

        let info = EntryInfo {
            name: "/abs/dir/file.bin".to_string(),
            ..info
        };
        assert_eq!(info.sanitized_name(), "abs/dir/file.bin");
    }
}
