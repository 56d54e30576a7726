//! Create command implementation.

use criarc_archive::Afs2Archive;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub fn cmd_create(
    archive: &Path,
    files: &[PathBuf],
    alignment: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if alignment == 0 {
        return Err("alignment must be at least 1".into());
    }

    let mut afs2 = Afs2Archive::new().with_alignment(alignment);
    for file in files {
        if !file.is_file() {
            return Err(format!("not a file: {}", file.display()).into());
        }
        afs2.push_external(file.clone());
    }

    let layout = afs2.layout()?;
    info!(entries = afs2.len(), width = %layout.width, "creating AFS2 archive");

    let mut writer = BufWriter::new(File::create(archive)?);
    let result = afs2.save(&mut writer).and_then(|n| {
        writer.flush()?;
        Ok(n)
    });
    let written = match result {
        Ok(n) => n,
        Err(e) => {
            drop(writer);
            let _ = std::fs::remove_file(archive);
            return Err(e.into());
        }
    };

    println!(
        "Created {} ({} entries, {} offsets, {} bytes)",
        archive.display(),
        afs2.len(),
        afs2.offset_width(),
        written
    );
    Ok(())
}
