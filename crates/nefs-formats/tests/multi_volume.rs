#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Split volumes: the stream abstraction and archives written across split files

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use binrw::Endian;
use nefs_formats::header::{HeaderTables, NefsIntro, TocVolume};
use nefs_formats::toc::NameTableBuilder;
use nefs_formats::volume::{MultiVolumeStream, split_file_path};
use nefs_formats::{
    NefsArchive, NefsDataSource, NefsDataTransform, NefsHeader, NefsItemList, NefsProgress,
    NefsVersion, NefsWriter, StdFileSystem,
};
use pretty_assertions::assert_eq;

fn bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn stream_reads_across_split_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("volume.dat");
    let data = bytes(250);
    std::fs::write(&base, &data[..100]).unwrap();
    std::fs::write(split_file_path(&base, 1), &data[100..200]).unwrap();
    std::fs::write(split_file_path(&base, 2), &data[200..]).unwrap();

    let fs = StdFileSystem;
    let mut stream = MultiVolumeStream::open(&fs, &base, 100);
    assert_eq!(stream.len().unwrap(), 250);

    let mut all = Vec::new();
    stream.read_to_end(&mut all).unwrap();
    assert_eq!(all, data);

    stream.seek(SeekFrom::Start(95)).unwrap();
    let mut across = [0u8; 10];
    stream.read_exact(&mut across).unwrap();
    assert_eq!(across.as_slice(), &data[95..105]);

    stream.seek(SeekFrom::End(-5)).unwrap();
    let mut tail = Vec::new();
    stream.read_to_end(&mut tail).unwrap();
    assert_eq!(tail.as_slice(), &data[245..]);
}

#[test]
fn stream_writes_split_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("volume.dat");
    let data = bytes(250);

    let fs = StdFileSystem;
    {
        let mut stream = MultiVolumeStream::open_writable(&fs, &base, 100);
        stream.write_all(&data).unwrap();
        stream.flush().unwrap();
    }

    let sizes: Vec<u64> = (0..3)
        .map(|k| std::fs::metadata(split_file_path(&base, k)).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert!(!split_file_path(&base, 3).exists());
    assert_eq!(std::fs::read(split_file_path(&base, 2)).unwrap(), &data[200..]);

    let mut stream = MultiVolumeStream::open(&fs, &base, 100);
    assert_eq!(stream.len().unwrap(), sizes.iter().sum::<u64>());
    for start in [240u64, 0, 150, 99] {
        stream.seek(SeekFrom::Start(start)).unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.as_slice(), &data[start as usize..], "from {start}");
    }
}

#[test]
fn split_file_names() {
    let base = std::path::Path::new("game/data.nefs");
    assert_eq!(split_file_path(base, 0), base);
    assert_eq!(
        split_file_path(base, 7),
        std::path::PathBuf::from("game/data.nefs.007")
    );
}

/// Empty 2.0.0 header whose single volume is split every `split_size` bytes
fn split_donor(split_size: u32) -> NefsHeader {
    let mut names = NameTableBuilder::new();
    let name_offset = names.add("split.nefs");
    let tables = HeaderTables {
        names: names.build(),
        volumes: vec![TocVolume {
            size: 0,
            name_offset,
            split_size,
        }],
        chunk_size: 0x10000,
        ..HeaderTables::default()
    };
    let (header, _) = NefsHeader::build(
        NefsVersion::V200,
        &NefsIntro::default(),
        &tables,
        Endian::Little,
        false,
    )
    .unwrap();
    header
}

#[test]
fn archive_written_across_split_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("split.nefs");
    let payload = bytes(0x3000);

    let mut items = NefsItemList::new();
    let folder = items.add_directory(None, "folder").unwrap();
    items
        .add_file(
            Some(folder),
            "payload.bin",
            NefsDataSource::Memory(Arc::new(payload.clone())),
            NefsDataTransform::default(),
        )
        .unwrap();
    items
        .add_file(
            Some(folder),
            "packed.bin",
            NefsDataSource::Memory(Arc::new(vec![7; 0x2000])),
            NefsDataTransform::new(0x10000).with_deflate(),
        )
        .unwrap();

    let header = NefsWriter::default()
        .write(&path, &split_donor(0x8000), &items, &NefsProgress::none())
        .unwrap();
    assert_eq!(header.volumes()[0].split_size, 0x8000);

    // Header padded to 0x10000, then the data
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0x8000);
    assert_eq!(
        std::fs::metadata(split_file_path(&path, 1)).unwrap().len(),
        0x8000
    );
    assert!(split_file_path(&path, 2).exists());
    assert!(!split_file_path(&path, 3).exists());

    let archive = NefsArchive::open(&path).unwrap();
    assert!(archive.header().is_hash_valid());
    assert_eq!(archive.items().len(), 3);

    let read = |name: &str| {
        let id = archive.items().find_by_path(name).unwrap().id;
        let mut out = Vec::new();
        archive
            .extract_item(id, &mut out, &NefsProgress::none())
            .unwrap();
        out
    };
    assert_eq!(read("folder/payload.bin"), payload);
    assert_eq!(read("folder/packed.bin"), vec![7; 0x2000]);

    // Re-saving keeps the split layout
    let second = dir.path().join("copy").join("split.nefs");
    std::fs::create_dir_all(second.parent().unwrap()).unwrap();
    let copy = archive.save(&second, &NefsProgress::none()).unwrap();
    assert_eq!(copy.header().volumes()[0].split_size, 0x8000);
    assert_eq!(
        std::fs::read(split_file_path(&second, 2)).unwrap(),
        std::fs::read(split_file_path(&path, 2)).unwrap()
    );
}
