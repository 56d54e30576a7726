//! Container format auto-detection.
//!
//! This module detects CRI formats from their magic numbers.

use criarc_core::error::Result;
use std::io::Read;

/// Known CRI formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// AFS2 wave bank (.awb, .acb payloads).
    Afs2,
    /// CPK file package (.cpk).
    Cpk,
    /// Bare @UTF table (.acf, .acb headers).
    Utf,
    /// Single CRILAYLA compressed frame.
    Crilayla,
    /// Unknown format.
    Unknown,
}

impl ArchiveFormat {
    /// Detect format from magic bytes.
    pub fn from_magic(magic: &[u8]) -> Self {
        if magic.len() < 4 {
            return Self::Unknown;
        }

        match &magic[..4] {
            b"AFS2" => return Self::Afs2,
            b"CPK " => return Self::Cpk,
            b"@UTF" => return Self::Utf,
            _ => {}
        }

        if criarc_crilayla::is_crilayla(magic) {
            return Self::Crilayla;
        }

        Self::Unknown
    }

    /// Detect format from a reader.
    pub fn detect<R: Read>(reader: &mut R) -> Result<(Self, Vec<u8>)> {
        let mut magic = Vec::with_capacity(16);
        reader.take(16).read_to_end(&mut magic)?;

        let format = Self::from_magic(&magic);
        Ok((format, magic))
    }

    /// Get the typical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Afs2 => "awb",
            Self::Cpk => "cpk",
            Self::Utf => "acf",
            Self::Crilayla => "bin",
            Self::Unknown => "",
        }
    }

    /// Check if this is a compressed single payload.
    pub fn is_compression_only(&self) -> bool {
        matches!(self, Self::Crilayla)
    }

    /// Check if this is a container of multiple entries.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Afs2 | Self::Cpk)
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Afs2 => write!(f, "AFS2"),
            Self::Cpk => write!(f, "CPK"),
            Self::Utf => write!(f, "@UTF table"),
            Self::Crilayla => write!(f, "CRILAYLA"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}
