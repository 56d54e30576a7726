//! Extract command implementation.

use crate::utils::{OpenArchive, create_progress_bar, filter_entries};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

fn write_entry(opened: &mut OpenArchive, index: usize, path: &Path) -> criarc_core::Result<u64> {
    let mut writer = BufWriter::new(File::create(path)?);
    let written = opened.extract_to(index, &mut writer)?;
    writer.flush()?;
    Ok(written)
}

pub fn cmd_extract(
    archive: &Path,
    output: &Path,
    files: &[String],
    include: &[String],
    exclude: &[String],
    progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut opened = OpenArchive::open(archive)?;
    let mut entries = filter_entries(opened.entries()?, include, exclude);
    if !files.is_empty() {
        entries.retain(|e| files.iter().any(|f| f == &e.name));
        if let Some(missing) = files.iter().find(|f| !entries.iter().any(|e| &e.name == *f)) {
            return Err(format!("entry not found: {}", missing).into());
        }
    }

    let pb = create_progress_bar(entries.len() as u64, progress);
    let mut total = 0u64;
    for entry in &entries {
        let name = entry.sanitized_name();
        if name.is_empty() {
            return Err(format!("entry #{} has no usable name", entry.index).into());
        }
        pb.set_message(name.clone());

        let path = output.join(&name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let written = match write_entry(&mut opened, entry.index, &path) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&path);
                pb.abandon();
                return Err(e.into());
            }
        };
        debug!(name = %name, bytes = written, "extracted");

        total += written;
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Extracted {} entries ({} bytes) to {}",
        entries.len(),
        total,
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use criarc_archive::cpk::{CpkArchive, IndexLayout};

    #[test]
    fn test_extract_cpk_with_filters() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.cpk");
        let out = dir.path().join("out");

        let mut cpk = CpkArchive::new(0x20, IndexLayout::Toc);
        cpk.push_memory("movie", "op.usm", b"CRID movie".to_vec());
        cpk.push_memory("", "readme.txt", b"text".to_vec());
        let mut bytes = Vec::new();
        cpk.save(&mut bytes).unwrap();
        fs::write(&input, bytes).unwrap();

        cmd_extract(&input, &out, &[], &["*.usm".to_string()], &[], false).unwrap();
        assert_eq!(fs::read(out.join("movie/op.usm")).unwrap(), b"CRID movie");
        assert!(!out.join("readme.txt").exists());

        cmd_extract(&input, &out, &["readme.txt".to_string()], &[], &[], false).unwrap();
        assert_eq!(fs::read(out.join("readme.txt")).unwrap(), b"text");

        assert!(cmd_extract(&input, &out, &["missing".to_string()], &[], &[], false).is_err());
    }
}
