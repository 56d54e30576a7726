//! Core traits for container access.
//!
//! Every container handler implements [`ArchiveReader`] for listing and
//! extraction and [`ArchiveWriter`] for serialization, which lets the CLI
//! treat AFS2 and CPK archives uniformly.

use crate::entry::EntryInfo;
use crate::error::{CriArcError, Result};
use std::io::Write;

/// A container that can list and extract entries.
pub trait ArchiveReader {
    /// Get the list of entries in the container.
    fn entries(&mut self) -> Result<Vec<EntryInfo>>;

    /// Extract the payload at `index`, decompressed if needed.
    fn extract(&mut self, index: usize) -> Result<Vec<u8>>;

    /// Extract an entry by name.
    fn extract_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self
            .entries()?
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.index)
            .ok_or_else(|| CriArcError::entry_not_found(name))?;
        self.extract(index)
    }

    /// Extract the payload at `index` into `writer`.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    fn extract_to<W: Write>(&mut self, index: usize, writer: &mut W) -> Result<u64> {
        let data = self.extract(index)?;
        writer.write_all(&data)?;
        Ok(data.len() as u64)
    }
}

/// A container that can be serialized.
pub trait ArchiveWriter {
    /// Write the whole container to `writer`.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    fn save<W: Write>(&mut self, writer: &mut W) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<(String, Vec<u8>)>);

    impl ArchiveReader for Fixed {
        fn entries(&mut self) -> Result<Vec<EntryInfo>> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(index, (name, data))| EntryInfo {
                    index,
                    name: name.clone(),
                    size: data.len() as u64,
                    stored_size: data.len() as u64,
                })
                .collect())
        }

        fn extract(&mut self, index: usize) -> Result<Vec<u8>> {
            self.0
                .get(index)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| CriArcError::entry_not_found(index.to_string()))
        }
    }

    #[test]
    fn test_extract_by_name() {
        let mut reader = Fixed(vec![
            ("a".to_string(), vec![1]),
            ("b".to_string(), vec![2, 3]),
        ]);
        assert_eq!(reader.extract_by_name("b").unwrap(), vec![2, 3]);
        assert!(matches!(
            reader.extract_by_name("c"),
            Err(CriArcError::EntryNotFound { .. })
        ));

        let mut out = Vec::new();
        assert_eq!(reader.extract_to(1, &mut out).unwrap(), 2);
    }
}
