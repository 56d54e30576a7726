//! Utility functions for the CLI.

use criarc_archive::{Afs2Archive, ArchiveFormat, CpkArchive};
use criarc_core::entry::EntryInfo;
use criarc_core::error::Result;
use criarc_core::traits::{ArchiveReader, ArchiveWriter};
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A container opened from disk.
pub enum OpenArchive {
    /// AFS2 wave bank.
    Afs2(Afs2Archive<BufReader<File>>),
    /// CPK package.
    Cpk(CpkArchive<BufReader<File>>),
}

impl OpenArchive {
    /// Detect the format of `path` and open it.
    pub fn open(path: &Path) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let mut reader = BufReader::new(File::open(path)?);
        let (format, _) = ArchiveFormat::detect(&mut reader)?;
        reader.seek(SeekFrom::Start(0))?;

        match format {
            ArchiveFormat::Afs2 => Ok(Self::Afs2(Afs2Archive::open(reader)?)),
            ArchiveFormat::Cpk => Ok(Self::Cpk(CpkArchive::open(reader)?)),
            other => Err(format!("{} is not a supported archive ({})", path.display(), other).into()),
        }
    }

    /// Format of the opened container.
    pub fn format(&self) -> ArchiveFormat {
        match self {
            Self::Afs2(_) => ArchiveFormat::Afs2,
            Self::Cpk(_) => ArchiveFormat::Cpk,
        }
    }

    /// List the entries.
    pub fn entries(&mut self) -> Result<Vec<EntryInfo>> {
        match self {
            Self::Afs2(archive) => archive.entries(),
            Self::Cpk(archive) => archive.entries(),
        }
    }

    /// Stream entry `index` into `writer`.
    pub fn extract_to<W: Write>(&mut self, index: usize, writer: &mut W) -> Result<u64> {
        match self {
            Self::Afs2(archive) => archive.extract_to(index, writer),
            Self::Cpk(archive) => archive.extract_to(index, writer),
        }
    }

    /// Point entry `index` at a file on disk.
    pub fn replace_external(&mut self, index: usize, path: PathBuf) -> Result<()> {
        match self {
            Self::Afs2(archive) => archive.replace_external(index, path),
            Self::Cpk(archive) => archive.replace_external(index, path),
        }
    }

    /// Serialize the container.
    pub fn save<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        match self {
            Self::Afs2(archive) => ArchiveWriter::save(archive, writer),
            Self::Cpk(archive) => ArchiveWriter::save(archive, writer),
        }
    }
}

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Check if a name matches the filter patterns.
/// - If include patterns are specified, the name must match at least one
/// - If exclude patterns are specified, the name must not match any
pub fn matches_filters(name: &str, include: &[String], exclude: &[String]) -> bool {
    let matches = |pattern_str: &String| {
        Pattern::new(pattern_str)
            .map(|pattern| pattern.matches(name))
            .unwrap_or(false)
    };

    if exclude.iter().any(matches) {
        return false;
    }
    include.is_empty() || include.iter().any(matches)
}

/// Filter entries based on include/exclude patterns.
pub fn filter_entries(entries: Vec<EntryInfo>, include: &[String], exclude: &[String]) -> Vec<EntryInfo> {
    if include.is_empty() && exclude.is_empty() {
        return entries;
    }

    entries
        .into_iter()
        .filter(|e| matches_filters(&e.name, include, exclude))
        .collect()
}

/// Print entries in a formatted table.
pub fn print_entries(entries: &[EntryInfo], long: bool) {
    if !long {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!("{:>5} {:>10} {:>10}  Name", "#", "Size", "Stored");
    println!("{}", "-".repeat(50));

    let mut total_size = 0u64;
    let mut total_stored = 0u64;
    for entry in entries {
        println!("{}", entry);
        total_size += entry.size;
        total_stored += entry.stored_size;
    }

    println!("{}", "-".repeat(50));
    println!(
        "{:>5} {:>10} {:>10}  {} entries, {} compressed",
        "",
        total_size,
        total_stored,
        entries.len(),
        entries.iter().filter(|e| e.is_compressed()).count()
    );
}
