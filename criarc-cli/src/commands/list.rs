//! List command implementation.

use crate::utils::{OpenArchive, filter_entries, print_entries};
use criarc_core::entry::EntryInfo;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON serializable entry data for archive listings.
#[derive(Debug, Serialize, Deserialize)]
struct EntryJson {
    index: usize,
    name: String,
    size: u64,
    stored_size: u64,
    compressed: bool,
    ratio: f64,
}

impl EntryJson {
    fn from_info(info: &EntryInfo) -> Self {
        Self {
            index: info.index,
            name: info.name.clone(),
            size: info.size,
            stored_size: info.stored_size,
            compressed: info.is_compressed(),
            ratio: info.compression_ratio(),
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveListJson {
    archive: String,
    format: String,
    entries: Vec<EntryJson>,
}

pub fn cmd_list(
    archive: &Path,
    long: bool,
    json: bool,
    include: &[String],
    exclude: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut opened = OpenArchive::open(archive)?;
    let entries = filter_entries(opened.entries()?, include, exclude);

    if json {
        let listing = ArchiveListJson {
            archive: archive.display().to_string(),
            format: opened.format().to_string(),
            entries: entries.iter().map(EntryJson::from_info).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Archive: {} ({})", archive.display(), opened.format());
    println!();
    print_entries(&entries, long);
    Ok(())
}
