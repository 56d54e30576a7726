//! # CriArc Archive
//!
//! CRI Middleware container support for CriArc.
//!
//! This crate provides reading and writing of:
//!
//! - **AFS2**: Wave banks (`.awb`) holding HCA/ADX streams
//! - **CPK**: File packages with TOC/ITOC/ETOC indexes and CRILAYLA entries
//! - **@UTF**: The row/column table format used by CPK sections
//!
//! ## Example
//!
//! ```rust,no_run
//! use criarc_archive::afs2::Afs2Archive;
//! use criarc_archive::detect::ArchiveFormat;
//! use std::fs::File;
//!
//! let mut file = File::open("voice.awb").unwrap();
//! let (format, _) = ArchiveFormat::detect(&mut file).unwrap();
//! println!("Format: {}", format);
//!
//! let archive = Afs2Archive::open(File::open("voice.awb").unwrap()).unwrap();
//! println!("{} entries", archive.len());
//! ```
//!
//! ## Format Detection
//!
//! Use [`detect::ArchiveFormat`] to detect the format of a file from its
//! magic bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod afs2;
pub mod cpk;
pub mod detect;

// Re-exports
pub use afs2::{Afs2Archive, Afs2Entry, Afs2Header, OffsetWidth};
pub use cpk::{CpkArchive, CpkEntry, EntryOrigin, IndexLayout, TableCodec, UtfTable};
pub use detect::ArchiveFormat;

use criarc_core::error::Result;
use std::io::Write;

/// Write `n` zero bytes.
pub(crate) fn write_zeros<W: Write + ?Sized>(writer: &mut W, n: u64) -> Result<()> {
    const ZEROS: [u8; 256] = [0; 256];
    let mut left = n;
    while left > 0 {
        let chunk = left.min(ZEROS.len() as u64) as usize;
        writer.write_all(&ZEROS[..chunk])?;
        left -= chunk as u64;
    }
    Ok(())
}
