#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Write/read round trips for every header version
//!
//! Archives are built from in-memory items, saved, re-read and saved again.
//! An unchanged re-save must reproduce the archive byte for byte.

use std::path::Path;
use std::sync::Arc;

use binrw::Endian;
use nefs_crypto::AesKey;
use nefs_formats::header::NefsVersion;
use nefs_formats::progress::CancellationToken;
use nefs_formats::{
    NefsArchive, NefsConfig, NefsDataSource, NefsDataTransform, NefsError, NefsItemState,
    NefsItemType, NefsProgress, NefsReader,
};
use pretty_assertions::assert_eq;

const KEY: [u8; 32] = [0x5A; 32];

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ (i / 7) as u8)
        .collect()
}

fn memory(bytes: Vec<u8>) -> NefsDataSource {
    NefsDataSource::Memory(Arc::new(bytes))
}

fn chunk_size(version: NefsVersion) -> u32 {
    if version == NefsVersion::V010 {
        0x10000
    } else {
        0x1000
    }
}

/// The richest transform each version can store
fn extra_transform(version: NefsVersion) -> NefsDataTransform {
    let base = NefsDataTransform::new(chunk_size(version));
    let key = AesKey::from_bytes(KEY);
    match version {
        NefsVersion::V010 => base.with_deflate(),
        NefsVersion::V130 => base.with_deflate().with_aes(key),
        NefsVersion::V150 => base.with_lzss().with_deflate(),
        NefsVersion::V151 => base.with_lzss(),
        NefsVersion::V160 => base.with_lzss().with_aes(key),
        NefsVersion::V200 => base.with_deflate().with_lzss().with_aes(key),
    }
}

/// d/, d/plain.bin, d/deflate.bin, d/sub/, d/sub/extra.bin, top.bin
fn sample_archive(version: NefsVersion, endian: Endian) -> NefsArchive {
    let mut archive = NefsArchive::new(version, endian);
    let items = archive.items_mut();

    let d = items.add_directory(None, "d").unwrap();
    items
        .add_file(Some(d), "plain.bin", memory(pattern(300, 1)), NefsDataTransform::default())
        .unwrap();
    items
        .add_file(
            Some(d),
            "deflate.bin",
            memory(pattern(10_000, 2)),
            NefsDataTransform::new(chunk_size(version)).with_deflate(),
        )
        .unwrap();
    let sub = items.add_directory(Some(d), "sub").unwrap();
    items
        .add_file(Some(sub), "extra.bin", memory(pattern(5_000, 3)), extra_transform(version))
        .unwrap();
    items
        .add_file(None, "top.bin", memory(pattern(64, 4)), NefsDataTransform::default())
        .unwrap();

    archive
}

fn extract(archive: &NefsArchive, path: &str) -> Vec<u8> {
    let item = archive
        .items()
        .find_by_path(path)
        .unwrap_or_else(|| panic!("{path} not found"));
    let mut out = Vec::new();
    archive
        .extract_item(item.id, &mut out, &NefsProgress::none())
        .unwrap();
    out
}

/// (id, parent, name, type, size) of every item
fn shape(archive: &NefsArchive) -> Vec<(u32, u32, String, NefsItemType, u64)> {
    archive
        .items()
        .iter()
        .map(|i| (i.id, i.directory_id, i.name.clone(), i.item_type, i.extracted_size))
        .collect()
}

fn header_bytes(path: &Path, archive: &NefsArchive) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    bytes[..archive.header().header_size() as usize].to_vec()
}

#[test]
fn round_trip_every_version() {
    for version in NefsVersion::ALL {
        let dir = tempfile::tempdir().unwrap();
        let first_path = dir.path().join("first").join("archive.nefs");
        let second_path = dir.path().join("second").join("archive.nefs");
        std::fs::create_dir_all(first_path.parent().unwrap()).unwrap();
        std::fs::create_dir_all(second_path.parent().unwrap()).unwrap();

        let archive = sample_archive(version, Endian::Little);
        let first = archive.save(&first_path, &NefsProgress::none()).unwrap();

        assert_eq!(first.version(), version);
        assert!(first.header().is_hash_valid(), "{version}: hash");
        assert_eq!(first.items().len(), 6, "{version}: item count");
        assert_eq!(shape(&first), shape(&archive), "{version}: item shape");
        assert!(
            first
                .items()
                .iter()
                .all(|i| i.state == NefsItemState::Unchanged)
        );

        assert_eq!(extract(&first, "d/plain.bin"), pattern(300, 1), "{version}");
        assert_eq!(extract(&first, "d/deflate.bin"), pattern(10_000, 2), "{version}");
        assert_eq!(extract(&first, "d/sub/extra.bin"), pattern(5_000, 3), "{version}");
        assert_eq!(extract(&first, "top.bin"), pattern(64, 4), "{version}");

        let deflated = first.items().find_by_path("d/deflate.bin").unwrap();
        assert_eq!(
            deflated.chunks().len() as u64,
            10_000u64.div_ceil(u64::from(chunk_size(version))),
            "{version}: chunk count"
        );
        assert!(
            deflated
                .chunks()
                .windows(2)
                .all(|w| w[0].cumulative_size < w[1].cumulative_size),
            "{version}: cumulative sizes increase"
        );

        let second = first.save(&second_path, &NefsProgress::none()).unwrap();
        assert_eq!(
            second.header().tables(),
            first.header().tables(),
            "{version}: tables"
        );
        assert_eq!(
            header_bytes(&second_path, &second),
            header_bytes(&first_path, &first),
            "{version}: header bytes"
        );
        assert_eq!(
            std::fs::read(&second_path).unwrap(),
            std::fs::read(&first_path).unwrap(),
            "{version}: archive bytes"
        );
    }
}

#[test]
fn version_200_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = NefsArchive::new(NefsVersion::V200, Endian::Little);
    let items = archive.items_mut();

    let d = items.add_directory(None, "d").unwrap();
    items
        .add_file(Some(d), "a.bin", memory(vec![0xAB; 100]), NefsDataTransform::default())
        .unwrap();
    items
        .add_file(
            Some(d),
            "b.bin",
            memory(b"nefs".repeat(12).into_iter().chain([1, 2]).collect()),
            NefsDataTransform::new(64).with_deflate(),
        )
        .unwrap();

    let saved = archive
        .save(dir.path().join("scenario.nefs"), &NefsProgress::none())
        .unwrap();

    assert_eq!(saved.items().len(), 3);
    let a = saved.items().find_by_path("d/a.bin").unwrap();
    let b = saved.items().find_by_path("d/b.bin").unwrap();
    assert_eq!(a.extracted_size, 100);
    assert!(a.chunks().is_empty());
    assert_eq!(b.extracted_size, 50);
    assert_eq!(b.chunks().len(), 1);
    assert!(b.chunks()[0].cumulative_size <= 50);
    assert!(b.transform.deflate);

    assert_eq!(extract(&saved, "d/a.bin"), vec![0xAB; 100]);
    assert_eq!(extract(&saved, "d/b.bin").len(), 50);
}

#[test]
fn both_byte_orders_decode_identically() {
    for version in [NefsVersion::V130, NefsVersion::V151, NefsVersion::V200] {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("little")).unwrap();
        std::fs::create_dir_all(dir.path().join("big")).unwrap();

        let little = sample_archive(version, Endian::Little)
            .save(dir.path().join("little/archive.nefs"), &NefsProgress::none())
            .unwrap();
        let big = sample_archive(version, Endian::Big)
            .save(dir.path().join("big/archive.nefs"), &NefsProgress::none())
            .unwrap();

        assert_eq!(big.header().endian(), Endian::Big);
        assert_eq!(little.header().endian(), Endian::Little);
        assert_eq!(big.header().tables(), little.header().tables(), "{version}");
        assert_eq!(shape(&big), shape(&little), "{version}");
        assert_eq!(
            extract(&big, "d/sub/extra.bin"),
            extract(&little, "d/sub/extra.bin")
        );
    }
}

#[test]
fn corrupted_header_byte_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.nefs");
    let saved = sample_archive(NefsVersion::V200, Endian::Little)
        .save(&path, &NefsProgress::none())
        .unwrap();

    // Flip a byte inside the name table
    let name_offset = saved.header().toc_info().name_offset as usize;
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[name_offset + 1] ^= 0x20;
    std::fs::write(&path, &bytes).unwrap();

    let reopened = NefsArchive::open(&path).unwrap();
    assert!(!reopened.header().is_hash_valid());
    assert_eq!(reopened.items().len(), 6);

    let unchecked = NefsReader::new(NefsConfig::default().with_hash_verification(false)).unwrap();
    let reopened = NefsArchive::open_with(
        &unchecked,
        reopened.source(),
        &NefsProgress::none(),
    )
    .unwrap();
    assert!(reopened.header().is_hash_valid());
}

#[test]
fn removal_renumbers_items() {
    let dir = tempfile::tempdir().unwrap();
    let saved = sample_archive(NefsVersion::V160, Endian::Little)
        .save(dir.path().join("first.nefs"), &NefsProgress::none())
        .unwrap();

    let mut edited = NefsArchive::open(saved.source().data_path()).unwrap();
    let plain = edited.items().find_by_path("d/plain.bin").unwrap().id;
    assert_eq!(edited.items_mut().remove(plain).unwrap(), 1);

    let resaved = edited
        .save(dir.path().join("second.nefs"), &NefsProgress::none())
        .unwrap();
    assert_eq!(resaved.items().len(), 5);
    assert!(resaved.items().find_by_path("d/plain.bin").is_none());

    let ids: Vec<u32> = resaved.items().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(resaved.items().path(3).unwrap(), "d/sub/extra.bin");
    assert_eq!(extract(&resaved, "d/sub/extra.bin"), pattern(5_000, 3));
    assert_eq!(extract(&resaved, "d/deflate.bin"), pattern(10_000, 2));
}

#[test]
fn replaced_item_gets_new_data() {
    let dir = tempfile::tempdir().unwrap();
    let saved = sample_archive(NefsVersion::V151, Endian::Little)
        .save(dir.path().join("first.nefs"), &NefsProgress::none())
        .unwrap();

    let mut edited = NefsArchive::open(saved.source().data_path()).unwrap();
    let id = edited.items().find_by_path("d/deflate.bin").unwrap().id;
    edited
        .items_mut()
        .replace(id, memory(b"replacement".to_vec()), None)
        .unwrap();

    let resaved = edited
        .save(dir.path().join("second.nefs"), &NefsProgress::none())
        .unwrap();
    assert_eq!(extract(&resaved, "d/deflate.bin"), b"replacement");
    assert_eq!(extract(&resaved, "d/plain.bin"), pattern(300, 1));
}

#[test]
fn duplicates_share_data() {
    for version in [NefsVersion::V150, NefsVersion::V160, NefsVersion::V200] {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = sample_archive(version, Endian::Little);

        let owner = archive
            .items()
            .find_by_path("d/deflate.bin")
            .unwrap()
            .clone();
        let mut duplicate = owner.clone();
        duplicate.id = archive.items().next_id();
        duplicate.duplicate_of = Some(owner.id);
        archive.items_mut().insert(duplicate.clone());

        let saved = archive
            .save(dir.path().join("dup.nefs"), &NefsProgress::none())
            .unwrap();
        let read_back = saved.items().get(duplicate.id).unwrap();
        assert_eq!(read_back.duplicate_of, Some(owner.id), "{version}");
        assert_eq!(read_back.name, "deflate.bin");

        let mut out = Vec::new();
        saved
            .extract_item(duplicate.id, &mut out, &NefsProgress::none())
            .unwrap();
        assert_eq!(out, pattern(10_000, 2), "{version}");
    }
}

#[test]
fn write_preconditions() {
    let dir = tempfile::tempdir().unwrap();

    let mut archive = sample_archive(NefsVersion::V200, Endian::Little);
    archive.items_mut().get_mut(0).unwrap().state = NefsItemState::Removed;
    let result = archive.save(dir.path().join("removed.nefs"), &NefsProgress::none());
    assert!(matches!(result, Err(NefsError::RemovedItem(0))));

    let mut archive = sample_archive(NefsVersion::V200, Endian::Little);
    let missing = dir.path().join("missing.bin");
    archive.items_mut().get_mut(1).unwrap().source = NefsDataSource::File(missing.clone());
    let result = archive.save(dir.path().join("missing.nefs"), &NefsProgress::none());
    assert!(matches!(result, Err(NefsError::SourceFileNotFound(path)) if path == missing));

    let mut archive = sample_archive(NefsVersion::V010, Endian::Little);
    archive
        .items_mut()
        .add_file(
            None,
            "odd.bin",
            memory(vec![1; 10]),
            NefsDataTransform::new(0x8000).with_deflate(),
        )
        .unwrap();
    let result = archive.save(dir.path().join("chunks.nefs"), &NefsProgress::none());
    assert!(matches!(
        result,
        Err(NefsError::InconsistentChunkSize { .. })
    ));
}

#[test]
fn file_sources_are_read_at_save_time() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.txt");
    std::fs::write(&source, b"from disk").unwrap();

    let mut archive = NefsArchive::new(NefsVersion::V150, Endian::Little);
    archive
        .items_mut()
        .add_file(
            None,
            "source.txt",
            NefsDataSource::File(source),
            NefsDataTransform::default().with_lzss(),
        )
        .unwrap();

    let saved = archive
        .save(dir.path().join("files.nefs"), &NefsProgress::none())
        .unwrap();
    assert_eq!(extract(&saved, "source.txt"), b"from disk");

    let out = dir.path().join("out").join("source.txt");
    let written = saved.extract_to(0, &out, &NefsProgress::none()).unwrap();
    assert_eq!(written, 9);
    assert_eq!(std::fs::read(out).unwrap(), b"from disk");
}

#[test]
fn cancelled_save_is_distinguishable() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let progress = NefsProgress::new(token, None);

    let result = sample_archive(NefsVersion::V200, Endian::Little)
        .save(dir.path().join("cancelled.nefs"), &progress);
    let error = result.unwrap_err();
    assert!(error.is_cancelled());
    assert!(!dir.path().join("cancelled.nefs").exists());
}

#[test]
fn block_hashes_detect_data_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hashed.nefs");
    let saved = sample_archive(NefsVersion::V160, Endian::Little)
        .save(&path, &NefsProgress::none())
        .unwrap();
    assert_eq!(saved.header().hash_digests().len(), 1);
    assert!(
        saved
            .verify_block_hashes(&NefsProgress::none())
            .unwrap()
            .is_empty()
    );

    let mut bytes = std::fs::read(&path).unwrap();
    let data_start = saved.header().data_start() as usize;
    bytes[data_start + 10] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let reopened = NefsArchive::open(&path).unwrap();
    assert_eq!(
        reopened.verify_block_hashes(&NefsProgress::none()).unwrap(),
        vec![0]
    );
}

#[test]
fn incompressible_data_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let noise: Vec<u8> = (0..0x2800).map(|_| rand::random::<u8>()).collect();

    for version in [NefsVersion::V151, NefsVersion::V200] {
        let mut archive = NefsArchive::new(version, Endian::Little);
        archive
            .items_mut()
            .add_file(
                None,
                "noise.bin",
                memory(noise.clone()),
                NefsDataTransform::new(0x1000).with_lzss(),
            )
            .unwrap();

        let saved = archive
            .save(dir.path().join(format!("noise-{version}.nefs")), &NefsProgress::none())
            .unwrap();
        let item = saved.items().find_by_path("noise.bin").unwrap();
        assert_eq!(item.chunks().len(), 3);
        assert_eq!(extract(&saved, "noise.bin"), noise, "{version}");
    }
}
