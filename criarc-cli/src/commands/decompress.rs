//! Decompress command implementation.

use criarc_crilayla::{CrilaylaFrame, decompress_frame};
use std::fs;
use std::path::Path;
use tracing::warn;

pub fn cmd_decompress(input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let compressed = fs::read(input)?;
    let frame = CrilaylaFrame::parse(&compressed)?;
    if !frame.has_magic() {
        warn!(input = %input.display(), "frame has no CRILAYLA tag, decoding anyway");
    }

    let data = decompress_frame(&compressed)?;
    fs::write(output, &data)?;

    println!(
        "Decompressed {} -> {} ({} -> {} bytes)",
        input.display(),
        output.display(),
        compressed.len(),
        data.len()
    );
    Ok(())
}
