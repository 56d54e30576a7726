//! Seekable input streams addressed by absolute offset.
//!
//! Container readers keep the archive stream open after loading so entries
//! can be read lazily. [`SourceHandle`] wraps that stream and only exposes
//! offset-taking reads, so no operation depends on where a previous one left
//! the stream position.

use crate::error::{CriArcError, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Chunk size for streamed copies.
const COPY_CHUNK: usize = 64 * 1024;

/// A seekable stream with a known length.
#[derive(Debug)]
pub struct SourceHandle<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> SourceHandle<R> {
    /// Wrap a stream and record its length.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    /// Total length of the stream in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_range(&self, offset: u64, size: u64) -> Result<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(CriArcError::truncated(
                offset,
                size,
                self.len.saturating_sub(offset),
            )),
        }
    }

    /// Fill `buf` with the bytes at `offset`.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len() as u64)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                CriArcError::truncated(offset, buf.len() as u64, self.len.saturating_sub(offset))
            }
            _ => e.into(),
        })
    }

    /// Read `size` bytes at `offset` into a new vector.
    pub fn read_vec_at(&mut self, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.check_range(offset, size)?;
        let mut buf = vec![0u8; size as usize];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Stream `size` bytes at `offset` into `writer` in bounded chunks.
    pub fn copy_range_to<W: Write + ?Sized>(
        &mut self,
        offset: u64,
        size: u64,
        writer: &mut W,
    ) -> Result<u64> {
        self.check_range(offset, size)?;
        let mut chunk = vec![0u8; COPY_CHUNK.min(size as usize)];
        let mut done = 0u64;
        while done < size {
            let n = chunk.len().min((size - done) as usize);
            self.read_at(offset + done, &mut chunk[..n])?;
            writer.write_all(&chunk[..n])?;
            done += n as u64;
        }
        Ok(done)
    }

    /// Consume the handle and return the stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_at_is_position_independent() {
        let mut source = SourceHandle::new(Cursor::new(b"0123456789".to_vec())).unwrap();
        assert_eq!(source.len(), 10);
        assert_eq!(source.read_vec_at(7, 3).unwrap(), b"789");
        assert_eq!(source.read_vec_at(2, 2).unwrap(), b"23");
    }

    #[test]
    fn test_out_of_range() {
        let mut source = SourceHandle::new(Cursor::new(vec![0u8; 4])).unwrap();
        let err = source.read_vec_at(2, 4).unwrap_err();
        assert!(matches!(
            err,
            CriArcError::Truncated {
                offset: 2,
                needed: 4,
                available: 2
            }
        ));
        assert!(source.read_vec_at(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_copy_range() {
        let data: Vec<u8> = (0..=255).cycle().take(200_000).collect();
        let mut source = SourceHandle::new(Cursor::new(data.clone())).unwrap();
        let mut out = Vec::new();
        let copied = source.copy_range_to(100, 150_000, &mut out).unwrap();
        assert_eq!(copied, 150_000);
        assert_eq!(out, &data[100..150_100]);
    }
}
