//! AFS2 save/load round trips.

use criarc_archive::afs2::{Afs2Archive, OffsetWidth};
use criarc_core::entry::EntryData;
use criarc_core::traits::ArchiveReader;
use std::io::{Cursor, Write};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn save<R: std::io::Read + std::io::Seek>(archive: &mut Afs2Archive<R>) -> Vec<u8> {
    let mut bytes = Vec::new();
    let written = archive.save(&mut bytes).unwrap();
    assert_eq!(written, bytes.len() as u64);
    bytes
}

#[test]
fn test_large_entry_selects_wide_offsets() {
    let payloads = [pattern(10, 1), pattern(70000, 2), pattern(5, 3)];
    let mut archive = Afs2Archive::new().with_alignment(0x20);
    for payload in &payloads {
        archive.push_memory(payload.clone());
    }
    assert_eq!(archive.layout().unwrap().width, OffsetWidth::Wide);

    let bytes = save(&mut archive);
    assert_eq!(bytes[5], 4);
    assert_eq!(archive.offset_width(), OffsetWidth::Wide);

    let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(loaded.offset_width(), OffsetWidth::Wide);
    assert_eq!(loaded.len(), 3);
    for (index, payload) in payloads.iter().enumerate() {
        assert_eq!(&loaded.extract(index).unwrap(), payload);
        if let EntryData::Internal { offset, .. } = loaded.entry(index).unwrap().data {
            assert_eq!(offset % 0x20, 0);
        } else {
            panic!("loaded entries refer to the source stream");
        }
    }
}

#[test]
fn test_offset_reaching_16_bit_limit_widens() {
    // a single entry starts at 0x20, so it ends at 0x20 + size
    let fits = pattern(0xFFDF, 4);
    let mut archive = Afs2Archive::new();
    archive.push_memory(fits.clone());
    let bytes = save(&mut archive);
    assert_eq!(bytes[5], 2);
    assert_eq!(bytes.len(), 0xFFFF);
    let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(loaded.offset_width(), OffsetWidth::Narrow);
    assert_eq!(loaded.extract(0).unwrap(), fits);

    let reaches = pattern(0xFFE0, 5);
    let mut archive = Afs2Archive::new();
    archive.push_memory(reaches.clone());
    let bytes = save(&mut archive);
    assert_eq!(bytes[5], 4);
    assert_eq!(bytes.len(), 0x1_0000);
    let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(loaded.offset_width(), OffsetWidth::Wide);
    assert_eq!(loaded.extract(0).unwrap(), reaches);
}

#[test]
fn test_small_archive_keeps_narrow_offsets() {
    let mut archive = Afs2Archive::new();
    archive.push_memory(pattern(100, 0));
    let bytes = save(&mut archive);
    assert_eq!(&bytes[4..8], &[1, 2, 2, 0]);

    let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(loaded.offset_width(), OffsetWidth::Narrow);
    assert_eq!(loaded.extract(0).unwrap(), pattern(100, 0));
}

#[test]
fn test_name_inference() {
    let mut archive = Afs2Archive::new();
    archive.push_memory(b"HCA\0rest of stream".to_vec());
    archive.push_memory(vec![0x80, 0x00, 0x00, 0x24, 0x03]);
    archive.push_memory(b"OggS".to_vec());
    archive.push_memory(vec![0x48]);
    let bytes = save(&mut archive);

    let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = loaded
        .entries()
        .unwrap()
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(names, ["0001.hca", "0002.adx", "0003.bin", "0004.bin"]);

    assert_eq!(loaded.find_by_name("0002.adx").unwrap(), Some(1));
    assert_eq!(loaded.extract_by_name("0003.bin").unwrap(), b"OggS");
    assert!(loaded.extract_by_name("0009.bin").is_err());
}

#[test]
fn test_external_entries() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pattern(300, 9)).unwrap();
    file.flush().unwrap();

    let mut archive = Afs2Archive::new();
    archive.push_memory(pattern(7, 1));
    archive.push_external(file.path());
    let bytes = save(&mut archive);

    let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(loaded.extract(1).unwrap(), pattern(300, 9));

    // the stat is taken at save time, not when the entry was added
    file.write_all(&[0xEE; 20]).unwrap();
    file.flush().unwrap();
    let bytes = save(&mut archive);
    let mut reloaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reloaded.extract(1).unwrap().len(), 320);
}

#[test]
fn test_replace_and_resave_loaded_archive() {
    let mut archive = Afs2Archive::new();
    archive.push_memory(pattern(40, 1));
    archive.push_memory(pattern(50, 2));
    let bytes = save(&mut archive);

    let mut loaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    loaded.replace_memory(0, pattern(64, 5)).unwrap();
    let bytes = save(&mut loaded);

    let mut reloaded = Afs2Archive::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reloaded.extract(0).unwrap(), pattern(64, 5));
    assert_eq!(reloaded.extract(1).unwrap(), pattern(50, 2));

    let mut streamed = Vec::new();
    let n = reloaded.extract_to(1, &mut streamed).unwrap();
    assert_eq!(n, 50);
    assert_eq!(streamed, pattern(50, 2));
}

#[test]
fn test_missing_external_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = Afs2Archive::new();
    archive.push_external(dir.path().join("missing.hca"));
    let mut bytes = Vec::new();
    let err = archive.save(&mut bytes).unwrap_err();
    assert!(matches!(err, criarc_core::CriArcError::Io(_)));
}
