#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Headless archives: header sections stored apart from the item data
//!
//! Covers sections placed by hand in a container file and sections shipped
//! in a NefsInject file.

use std::sync::Arc;

use binrw::Endian;
use nefs_formats::header::NefsInjectHeader;
use nefs_formats::{
    NefsArchive, NefsArchiveSource, NefsDataSource, NefsDataTransform, NefsError, NefsProgress,
    NefsReader, NefsVersion,
};
use pretty_assertions::assert_eq;

fn sample(version: NefsVersion, endian: Endian) -> NefsArchive {
    let mut archive = NefsArchive::new(version, endian);
    let items = archive.items_mut();
    let root = items.add_directory(None, "root").unwrap();
    let nested = items.add_directory(Some(root), "nested").unwrap();
    items
        .add_file(
            Some(nested),
            "level.bin",
            NefsDataSource::Memory(Arc::new(b"level data ".repeat(400))),
            NefsDataTransform::new(0x800).with_lzss(),
        )
        .unwrap();
    items
        .add_file(
            Some(root),
            "readme.txt",
            NefsDataSource::Memory(Arc::new(b"hello".to_vec())),
            NefsDataTransform::default(),
        )
        .unwrap();
    archive
}

fn extract(archive: &NefsArchive, path: &str) -> Vec<u8> {
    let id = archive.items().find_by_path(path).unwrap().id;
    let mut out = Vec::new();
    archive
        .extract_item(id, &mut out, &NefsProgress::none())
        .unwrap();
    out
}

#[test]
fn headless_sections_read_from_container() {
    for (version, endian) in [
        (NefsVersion::V160, Endian::Little),
        (NefsVersion::V200, Endian::Big),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("data.bin");
        let output = sample(version, endian)
            .save_headless(&data_path, &NefsProgress::none())
            .unwrap();

        assert_eq!(
            (output.primary.len() + output.secondary.len()) as u32,
            output.header.header_size()
        );

        // Primary and secondary apart, surrounded by unrelated bytes
        let mut container = vec![0x90u8; 0x40];
        let primary_offset = container.len() as u64;
        container.extend_from_slice(&output.primary);
        container.extend_from_slice(&[0x90; 0x33]);
        let secondary_offset = container.len() as u64;
        container.extend_from_slice(&output.secondary);
        container.extend_from_slice(&[0x90; 0x10]);
        let container_path = dir.path().join("game.exe");
        std::fs::write(&container_path, &container).unwrap();

        let source = NefsArchiveSource::Headless {
            header_path: container_path,
            primary_offset,
            primary_size: output.primary.len() as u32,
            secondary_offset,
            secondary_size: output.secondary.len() as u32,
            data_path: data_path.clone(),
        };
        assert_eq!(source.data_path(), data_path.as_path());
        assert!(!source.is_standard());

        let archive =
            NefsArchive::open_with(&NefsReader::default(), &source, &NefsProgress::none())
                .unwrap();
        assert!(archive.header().is_hash_valid(), "{version}");
        assert_eq!(archive.header().tables(), output.header.tables());
        assert_eq!(archive.items().len(), 4);
        assert_eq!(extract(&archive, "root/nested/level.bin"), b"level data ".repeat(400));
        assert_eq!(extract(&archive, "root/readme.txt"), b"hello");
        assert!(
            archive
                .verify_block_hashes(&NefsProgress::none())
                .unwrap()
                .is_empty()
        );
    }
}

#[test]
fn headless_requires_split_header_version() {
    let dir = tempfile::tempdir().unwrap();
    for version in [NefsVersion::V010, NefsVersion::V130, NefsVersion::V151] {
        let result = sample_without_lzss(version)
            .save_headless(dir.path().join("data.bin"), &NefsProgress::none());
        assert!(
            matches!(result, Err(NefsError::InvalidHeader(_))),
            "{version}"
        );
    }
}

fn sample_without_lzss(version: NefsVersion) -> NefsArchive {
    let mut archive = NefsArchive::new(version, Endian::Little);
    archive
        .items_mut()
        .add_file(
            None,
            "only.bin",
            NefsDataSource::Memory(Arc::new(vec![1, 2, 3])),
            NefsDataTransform::default(),
        )
        .unwrap();
    archive
}

#[test]
fn inject_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    std::fs::create_dir_all(&first).unwrap();
    std::fs::create_dir_all(&second).unwrap();

    let saved = sample(NefsVersion::V200, Endian::Little)
        .save_inject(
            first.join("game.nefsinject"),
            first.join("data.bin"),
            &NefsProgress::none(),
        )
        .unwrap();

    assert_eq!(
        saved.source(),
        &NefsArchiveSource::inject(first.join("game.nefsinject"), first.join("data.bin"))
    );
    assert!(saved.header().is_hash_valid());
    assert_eq!(saved.items().len(), 4);
    assert_eq!(extract(&saved, "root/nested/level.bin"), b"level data ".repeat(400));

    let inject = std::fs::read(first.join("game.nefsinject")).unwrap();
    let prefix = NefsInjectHeader::read_from(&mut std::io::Cursor::new(&inject)).unwrap();
    assert_eq!(prefix.primary_offset, NefsInjectHeader::SIZE as u64);
    assert_eq!(
        prefix.primary_size + prefix.secondary_size,
        saved.header().header_size()
    );
    assert_eq!(
        inject.len(),
        NefsInjectHeader::SIZE + saved.header().header_size() as usize
    );

    // Unchanged items are copied verbatim
    let again = saved
        .save_inject(
            second.join("game.nefsinject"),
            second.join("data.bin"),
            &NefsProgress::none(),
        )
        .unwrap();
    assert_eq!(again.header().tables(), saved.header().tables());
    assert_eq!(
        std::fs::read(second.join("game.nefsinject")).unwrap(),
        inject
    );
    assert_eq!(
        std::fs::read(second.join("data.bin")).unwrap(),
        std::fs::read(first.join("data.bin")).unwrap()
    );
}

#[test]
fn inject_file_with_bad_magic() {
    let dir = tempfile::tempdir().unwrap();
    let inject_path = dir.path().join("broken.nefsinject");
    std::fs::write(&inject_path, [0u8; 64]).unwrap();

    let result = NefsReader::default().read(
        &NefsArchiveSource::inject(&inject_path, dir.path().join("data.bin")),
        &NefsProgress::none(),
    );
    assert!(matches!(result, Err(NefsError::InvalidHeader(_))));
}
