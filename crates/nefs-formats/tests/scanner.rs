#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Locating headless headers embedded in executable images

use std::path::Path;
use std::sync::Arc;

use binrw::Endian;
use nefs_formats::scanner::discover_in_image;
use nefs_formats::writer::HeadlessOutput;
use nefs_formats::{
    NefsArchive, NefsArchiveSource, NefsConfig, NefsDataSource, NefsDataTransform, NefsProgress,
    NefsReader, NefsVersion, discover_headers,
};
use pretty_assertions::assert_eq;

const FILL: u8 = 0xCC;

fn headless(
    version: NefsVersion,
    endian: Endian,
    data_path: &Path,
    files: usize,
) -> HeadlessOutput {
    let mut archive = NefsArchive::new(version, endian);
    let items = archive.items_mut();
    let dir = items.add_directory(None, "assets").unwrap();
    for i in 0..files {
        let transform = if i % 2 == 0 {
            NefsDataTransform::new(0x1000).with_deflate()
        } else {
            NefsDataTransform::default()
        };
        items
            .add_file(
                Some(dir),
                format!("file{i}.dat"),
                NefsDataSource::Memory(Arc::new(vec![i as u8; 100 + i * 10])),
                transform,
            )
            .unwrap();
    }
    archive
        .save_headless(data_path, &NefsProgress::none())
        .unwrap()
}

fn pad_to(image: &mut Vec<u8>, alignment: usize) {
    while image.len() % alignment != 0 {
        image.push(FILL);
    }
}

/// Image with two embedded headers; returns it with the primary and
/// secondary offsets of each
fn build_image(first: &HeadlessOutput, second: &HeadlessOutput) -> (Vec<u8>, [(u64, u64); 2]) {
    let mut image = vec![FILL; 0x103];
    let first_primary = image.len() as u64;
    image.extend_from_slice(&first.primary);
    image.extend_from_slice(&[FILL; 0x51]);
    let second_primary = image.len() as u64;
    image.extend_from_slice(&second.primary);

    image.extend_from_slice(&[FILL; 0x200]);
    pad_to(&mut image, 4);
    let first_secondary = image.len() as u64;
    image.extend_from_slice(&first.secondary);
    image.extend_from_slice(&[FILL; 0x40]);
    pad_to(&mut image, 4);
    let second_secondary = image.len() as u64;
    image.extend_from_slice(&second.secondary);
    image.extend_from_slice(&[FILL; 0x40]);

    (
        image,
        [
            (first_primary, first_secondary),
            (second_primary, second_secondary),
        ],
    )
}

fn assert_readable(source: &NefsArchiveSource, files: usize) {
    let archive =
        NefsArchive::open_with(&NefsReader::default(), source, &NefsProgress::none()).unwrap();
    assert!(archive.header().is_hash_valid());
    assert_eq!(archive.items().len(), files + 1);

    let last = files - 1;
    let item = archive
        .items()
        .find_by_path(&format!("assets/file{last}.dat"))
        .unwrap();
    let mut out = Vec::new();
    archive
        .extract_item(item.id, &mut out, &NefsProgress::none())
        .unwrap();
    assert_eq!(out, vec![last as u8; 100 + last * 10]);
}

#[test]
fn finds_two_embedded_headers() {
    let dir = tempfile::tempdir().unwrap();
    let first = headless(
        NefsVersion::V200,
        Endian::Little,
        &dir.path().join("data1.bin"),
        3,
    );
    let second = headless(
        NefsVersion::V160,
        Endian::Little,
        &dir.path().join("data2.bin"),
        6,
    );
    let (image, offsets) = build_image(&first, &second);

    let exe = dir.path().join("game.exe");
    let sources = discover_in_image(
        &image,
        &exe,
        dir.path(),
        &NefsConfig::default(),
        &NefsProgress::none(),
    )
    .unwrap();

    assert_eq!(sources.len(), 2);
    for ((source, (primary, secondary)), (output, data)) in sources
        .iter()
        .zip(offsets)
        .zip([(&first, "data1.bin"), (&second, "data2.bin")])
    {
        assert_eq!(
            source,
            &NefsArchiveSource::Headless {
                header_path: exe.clone(),
                primary_offset: primary,
                primary_size: output.primary.len() as u32,
                secondary_offset: secondary,
                secondary_size: output.secondary.len() as u32,
                data_path: dir.path().join(data),
            }
        );
    }

    // The reader needs the image on disk
    std::fs::write(&exe, &image).unwrap();
    assert_readable(&sources[0], 3);
    assert_readable(&sources[1], 6);
}

#[test]
fn scans_executable_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let first = headless(
        NefsVersion::V200,
        Endian::Big,
        &dir.path().join("big.bin"),
        4,
    );
    let second = headless(
        NefsVersion::V200,
        Endian::Little,
        &dir.path().join("little.bin"),
        2,
    );
    let (image, offsets) = build_image(&first, &second);
    let exe = dir.path().join("game.bin");
    std::fs::write(&exe, &image).unwrap();

    let sources = discover_headers(
        &exe,
        dir.path(),
        &NefsConfig::default(),
        &NefsProgress::none(),
    )
    .unwrap();
    assert_eq!(sources.len(), 2);

    let NefsArchiveSource::Headless {
        primary_offset,
        secondary_offset,
        data_path,
        ..
    } = &sources[0]
    else {
        panic!("expected a headless source");
    };
    assert_eq!((*primary_offset, *secondary_offset), offsets[0]);
    assert_eq!(data_path, &dir.path().join("big.bin"));

    assert_readable(&sources[0], 4);
    assert_readable(&sources[1], 2);
}

#[test]
fn image_without_headers() {
    let dir = tempfile::tempdir().unwrap();
    let image = vec![FILL; 0x1000];
    let sources = discover_in_image(
        &image,
        &dir.path().join("plain.exe"),
        dir.path(),
        &NefsConfig::default(),
        &NefsProgress::none(),
    )
    .unwrap();
    assert!(sources.is_empty());

    let empty = dir.path().join("empty.exe");
    std::fs::write(&empty, b"").unwrap();
    let sources = discover_headers(
        &empty,
        dir.path(),
        &NefsConfig::default(),
        &NefsProgress::none(),
    )
    .unwrap();
    assert!(sources.is_empty());
}
