//! Replace command implementation.

use crate::utils::OpenArchive;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub fn cmd_replace(
    archive: &Path,
    entry: &str,
    file: &Path,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if output.exists() && fs::canonicalize(output)? == fs::canonicalize(archive)? {
        return Err("output must differ from the input archive".into());
    }

    let mut opened = OpenArchive::open(archive)?;
    let index = opened
        .entries()?
        .into_iter()
        .find(|e| e.name == entry)
        .map(|e| e.index)
        .ok_or_else(|| format!("entry not found: {}", entry))?;
    opened.replace_external(index, file.to_path_buf())?;

    let mut writer = BufWriter::new(File::create(output)?);
    let result = opened.save(&mut writer).and_then(|n| {
        writer.flush()?;
        Ok(n)
    });
    let written = match result {
        Ok(n) => n,
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(output);
            return Err(e.into());
        }
    };

    println!(
        "Replaced {} in {} -> {} ({} bytes)",
        entry,
        archive.display(),
        output.display(),
        written
    );
    Ok(())
}
