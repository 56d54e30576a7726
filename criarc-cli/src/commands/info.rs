//! Info command implementation.

use criarc_archive::cpk::{Section, TableCodec, UtfTable};
use criarc_archive::{Afs2Archive, ArchiveFormat, CpkArchive};
use criarc_crilayla::CrilaylaFrame;
use std::fs::{self, File};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

pub fn cmd_info(archive: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(archive)?;
    let mut reader = BufReader::new(file);

    let (format, _) = ArchiveFormat::detect(&mut reader)?;
    let metadata = fs::metadata(archive)?;

    println!("Archive Information");
    println!("===================");
    println!("File: {}", archive.display());
    println!("Format: {}", format);
    println!("Size: {} bytes", metadata.len());

    reader.seek(SeekFrom::Start(0))?;

    match format {
        ArchiveFormat::Afs2 => {
            let afs2 = Afs2Archive::open(reader)?;
            let version = afs2.version();

            println!();
            println!("AFS2 Header:");
            println!(
                "  Version: {:02X} {:02X} {:02X} {:02X}",
                version[0], version[1], version[2], version[3]
            );
            println!("  Offset width: {}", afs2.offset_width());
            println!("  Alignment: {:#x}", afs2.alignment());
            println!("  Entries: {}", afs2.len());
        }
        ArchiveFormat::Cpk => {
            let cpk: CpkArchive<_> = CpkArchive::open(reader)?;
            let header = cpk.header().table();
            let column = |name: &str| header.get_u64(name, 0).unwrap_or(0);

            println!();
            println!("CPK Header:");
            println!("  Layout: {}", cpk.layout());
            println!("  Alignment: {:#x}", cpk.align());
            println!("  Masked tables: {}", cpk.header().is_masked());
            println!("  Content: {:#x} ({} bytes)", column("ContentOffset"), column("ContentSize"));
            print_section("TOC", cpk.toc(), column("TocOffset"));
            print_section("ITOC", cpk.itoc(), column("ItocOffset"));
            print_section("ETOC", cpk.etoc(), column("EtocOffset"));

            let compressed = (0..cpk.len())
                .filter_map(|i| cpk.entry(i))
                .filter(|e| e.is_compressed())
                .count();
            println!();
            println!("Contents:");
            println!("  Files: {}", cpk.len());
            println!("  CRILAYLA compressed: {}", compressed);
        }
        ArchiveFormat::Utf => {
            let bytes = fs::read(archive)?;
            let table = UtfTable::load(&bytes)?;

            println!();
            println!("@UTF Table:");
            println!("  Name: {}", table.table_name());
            println!("  Rows: {}", table.row_count());
            println!("  Strings: {}", if table.is_shift_jis() { "Shift_JIS" } else { "UTF-8" });
            println!("  Columns:");
            for name in table.column_names() {
                if let (Some(kind), Some(storage)) = (table.kind(name), table.storage(name)) {
                    println!("    {:<24} {:?} ({:?})", name, kind, storage);
                }
            }
        }
        ArchiveFormat::Crilayla => {
            let bytes = fs::read(archive)?;
            let frame = CrilaylaFrame::parse(&bytes)?;

            println!();
            println!("CRILAYLA Frame:");
            println!("  Tagged: {}", frame.has_magic());
            println!("  Raw size: {} bytes", frame.raw_size);
            println!("  Header offset: {:#x}", frame.header_offset);
            println!("  Uncompressed size: {} bytes", frame.uncompressed_size());
        }
        ArchiveFormat::Unknown => {}
    }

    Ok(())
}

fn print_section(label: &str, section: Option<&Section<UtfTable>>, offset: u64) {
    match section {
        Some(section) => println!(
            "  {}: {:#x} ({} rows{})",
            label,
            offset,
            section.table().row_count(),
            if section.is_masked() { ", masked" } else { "" }
        ),
        None => println!("  {}: -", label),
    }
}
