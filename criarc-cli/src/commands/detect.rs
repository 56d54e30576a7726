//! Detect command implementation.

use criarc_archive::ArchiveFormat;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn cmd_detect(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let f = File::open(file)?;
    let mut reader = BufReader::new(f);

    let (format, magic) = ArchiveFormat::detect(&mut reader)?;

    println!("File: {}", file.display());
    println!("Format: {}", format);
    if !format.extension().is_empty() {
        println!("Extension: .{}", format.extension());
    }
    println!("Magic bytes: {:02X?}", &magic[..magic.len().min(16)]);

    if format.is_archive() {
        println!("Type: Archive (multiple entries)");
    } else if format.is_compression_only() {
        println!("Type: Compression (single payload)");
    }

    Ok(())
}
