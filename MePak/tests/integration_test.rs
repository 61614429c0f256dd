use std::io::Cursor;

use mepak::package::{decompress_full_file_me3, MAX_CHUNK_SIZE};
use mepak::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Package with two imports (`Object` and `WwiseStream` classes) and one
/// export per entry of `payloads`, all of class `Object`.
fn sample(game: MeGame, payloads: &[usize]) -> Package {
    let mut package = Package::new(game);
    package.add_name("None");
    let core = package.add_name("Core") as i32;
    let class = package.add_name("Class") as i32;
    let object = package.add_name("Object") as i32;
    let stream = package.add_name("WwiseStream") as i32;
    let thing = package.add_name("Thing") as i32;

    let object_class = package.add_import(ImportEntry::new(
        NameRef::new(core, 0),
        NameRef::new(class, 0),
        0,
        NameRef::new(object, 0),
    ));
    package.add_import(ImportEntry::new(
        NameRef::new(core, 0),
        NameRef::new(class, 0),
        0,
        NameRef::new(stream, 0),
    ));

    for (number, len) in payloads.iter().enumerate() {
        package.add_export(ExportEntry::new(
            object_class,
            0,
            0,
            NameRef::new(thing, number as i32 + 1),
            pattern(*len),
        ));
    }
    package
}

/// WwiseStream payload: net index, `None` terminator, then one bulk data
/// header whose offset field sits at byte 24.
fn wwise_stream_payload(audio_len: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for value in [0i32, 0, 0, 0, audio_len as i32, audio_len as i32, -1] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data.extend(pattern(audio_len));
    data
}

fn add_wwise_stream(package: &mut Package, audio_len: usize) -> i32 {
    let name = package.add_name("Music_Stream") as i32;
    package.add_export(ExportEntry::new(-2, 0, 0, NameRef::new(name, 0), wwise_stream_payload(audio_len)))
}

fn stored_offset(payload: &[u8]) -> i32 {
    i32::from_le_bytes(payload[24..28].try_into().unwrap())
}

fn assert_same_tables(expected: &Package, actual: &Package) {
    assert_eq!(actual.game(), expected.game());
    assert_eq!(actual.names(), expected.names());
    assert_eq!(actual.import_count(), expected.import_count());
    assert_eq!(actual.export_count(), expected.export_count());
    for uindex in 1..=expected.export_count() as i32 {
        assert_eq!(actual.object_name(uindex).unwrap(), expected.object_name(uindex).unwrap());
        assert_eq!(actual.class_name(uindex).unwrap(), expected.class_name(uindex).unwrap());
    }
    for (a, e) in actual.exports().iter().zip(expected.exports()) {
        assert_eq!(a.data(), e.data());
        assert_eq!(a.header(), e.header());
    }
}

#[test]
fn test_roundtrip_each_game_and_codec() {
    let cases = [
        (MeGame::Me1, CompressionType::None),
        (MeGame::Me2, CompressionType::None),
        (MeGame::Me2, CompressionType::Lzo),
        (MeGame::Me2, CompressionType::Zlib),
        (MeGame::Me3, CompressionType::None),
        (MeGame::Me3, CompressionType::Zlib),
        (MeGame::Me3, CompressionType::Lzo),
    ];

    for (game, compression) in cases {
        let mut package = sample(game, &[16, 300_000, 0, 5]);
        let options = SaveOptions::new()
            .with_compress(compression != CompressionType::None)
            .with_compression(Some(compression));
        let bytes = package.save_to_vec(&options).unwrap();

        let reopened = Package::from_bytes(&bytes).unwrap();
        assert_same_tables(&package, &reopened);
        assert_eq!(reopened.is_compressed_on_disk(), compression != CompressionType::None);
        assert_eq!(reopened.header().compression, compression);
        assert!(!reopened.is_modified());
    }
}

#[test]
fn test_me1_never_compresses() {
    let mut package = sample(MeGame::Me1, &[64]);
    let bytes = package.save_to_vec(&SaveOptions::compressed()).unwrap();
    let reopened = Package::from_bytes(&bytes).unwrap();
    assert!(!reopened.flags().is_compressed());
    assert!(reopened.header().chunks.is_empty());
}

#[test]
fn test_save_is_idempotent() {
    for (game, compress) in [(MeGame::Me2, true), (MeGame::Me3, false), (MeGame::Me3, true)] {
        let mut package = sample(game, &[100, 2000]);
        add_wwise_stream(&mut package, 64);
        let options = SaveOptions::new().with_compress(compress);

        let first = package.save_to_vec(&options).unwrap();
        let second = package.save_to_vec(&options).unwrap();
        assert_eq!(first, second);

        let mut reopened = Package::from_bytes(&first).unwrap();
        assert_eq!(reopened.save_to_vec(&options).unwrap(), first);
    }
}

#[test]
fn test_chunks_cover_image_in_order() {
    let half = MAX_CHUNK_SIZE / 2 + 0x10000;
    let mut package = sample(MeGame::Me3, &[half, half, 100]);
    let bytes = package.save_to_vec(&SaveOptions::compressed()).unwrap();

    let reopened = Package::from_bytes(&bytes).unwrap();
    let header = reopened.header();
    assert_eq!(header.compression, CompressionType::Zlib);
    assert_eq!(header.chunks.len(), 3);
    assert_eq!(header.name_count, reopened.names().len() as u32);
    assert_eq!(header.import_count, 2);
    assert_eq!(header.export_count, 3);

    // table region, first payload, then the other two packed together
    let chunks = &header.chunks;
    assert_eq!(chunks[0].uncompressed_offset, header.name_offset);
    assert_eq!(chunks[0].uncompressed_size, header.full_header_size - header.name_offset);
    assert_eq!(chunks[1].uncompressed_size as usize, half);
    assert_eq!(chunks[2].uncompressed_size as usize, half + 100);

    for pair in chunks.windows(2) {
        assert_eq!(pair[0].uncompressed_offset + pair[0].uncompressed_size, pair[1].uncompressed_offset);
        assert_eq!(pair[0].compressed_offset + pair[0].compressed_size, pair[1].compressed_offset);
    }
    let last = chunks[chunks.len() - 1];
    assert_eq!((last.compressed_offset + last.compressed_size) as usize, bytes.len());
    for chunk in chunks {
        assert!(chunk.uncompressed_size as usize <= MAX_CHUNK_SIZE);
    }
}

#[test]
fn test_oversize_export_gets_own_chunk() {
    let big = MAX_CHUNK_SIZE + 100;
    let mut package = sample(MeGame::Me2, &[10, big, 20]);
    let bytes = package.save_to_vec(&SaveOptions::compressed()).unwrap();

    let reopened = Package::from_bytes(&bytes).unwrap();
    let chunks = &reopened.header().chunks;
    assert_eq!(reopened.header().compression, CompressionType::Lzo);
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[2].uncompressed_size as usize, big);
    assert_eq!(chunks[2].uncompressed_offset, reopened.exports()[1].data_offset() as u32);
    assert_eq!(reopened.export_payload(1).unwrap(), pattern(big).as_slice());
}

#[test]
fn test_wwise_stream_offset_follows_payload() {
    let mut package = sample(MeGame::Me3, &[40]);
    let stream = add_wwise_stream(&mut package, 64);
    let index = stream as usize - 1;

    let bytes = package.save_to_vec(&SaveOptions::new()).unwrap();
    let reopened = Package::from_bytes(&bytes).unwrap();
    let export = &reopened.exports()[index];
    let offset = stored_offset(export.data());
    assert_eq!(offset, export.data_offset() + 28);
    assert!(offset >= export.data_offset() && offset < export.data_offset() + export.data_size());
    assert_eq!(&bytes[offset as usize..offset as usize + 64], pattern(64).as_slice());

    // grow the export in front of it and save compressed
    let mut reopened = reopened;
    reopened.set_export_payload(0, pattern(1040)).unwrap();
    let moved = reopened.save_to_vec(&SaveOptions::compressed()).unwrap();
    let moved = Package::from_bytes(&moved).unwrap();
    let export = &moved.exports()[index];
    assert_eq!(stored_offset(export.data()), offset + 1000);
    assert_eq!(stored_offset(export.data()), export.data_offset() + 28);
}

#[test]
fn test_default_object_is_not_relocated() {
    let mut package = sample(MeGame::Me3, &[8]);
    let name = package.add_name("Default__WwiseStream") as i32;
    let uindex = package.add_export(ExportEntry::new(-2, 0, 0, NameRef::new(name, 0), wwise_stream_payload(16)));

    package.save_to_vec(&SaveOptions::new()).unwrap();
    assert_eq!(stored_offset(package.export_payload(uindex as usize - 1).unwrap()), -1);
}

#[test]
fn test_table_edits_survive_compressed_save() {
    let mut package = sample(MeGame::Me2, &[32, 32]);
    let bytes = package.save_to_vec(&SaveOptions::compressed()).unwrap();

    let mut reopened = Package::from_bytes(&bytes).unwrap();
    reopened.replace_name(5, "Renamed").unwrap();
    let extra = reopened.add_name("Extra") as i32;
    let uindex = reopened.add_export(ExportEntry::new(-1, 0, 1, NameRef::new(extra, 0), vec![7; 9]));
    assert!(reopened.is_modified());

    let bytes = reopened.save_to_vec(&SaveOptions::compressed()).unwrap();
    let last = Package::from_bytes(&bytes).unwrap();
    assert_eq!(last.export_count(), 3);
    assert_eq!(last.object_name(1).unwrap(), "Renamed_0");
    assert_eq!(last.object_name(uindex).unwrap(), "Extra");
    assert_eq!(last.class_name(uindex).unwrap(), "Object");
    assert_eq!(last.export_payload(2).unwrap(), vec![7u8; 9].as_slice());
}

#[test]
fn test_save_and_open_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("BioD_Test.pcc");

    let mut package = sample(MeGame::Me3, &[128, 256, 512]);
    package.save(&path, true).unwrap();
    assert_eq!(package.file_path(), Some(path.as_path()));

    let opened = Package::open(&path, false).unwrap();
    assert!(opened.is_compressed_on_disk());
    assert_same_tables(&package, &opened);

    let header_only = Package::open(&path, true).unwrap();
    assert!(header_only.is_header_only());
    assert_eq!(header_only.export_count(), 3);
    assert!(header_only.exports().is_empty());
    assert_eq!(header_only.guid(), package.guid());
}

#[test]
fn test_bad_magic_is_format_error() {
    let err = Package::from_bytes(&[0x42; 128]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.is_format_error());
}

#[test]
fn test_corrupt_chunk_magic_is_format_error() {
    let mut package = sample(MeGame::Me3, &[64]);
    let mut bytes = package.save_to_vec(&SaveOptions::compressed()).unwrap();

    let at = package.header().chunks[1].compressed_offset as usize;
    bytes[at..at + 4].copy_from_slice(&[0; 4]);
    let err = Package::from_bytes(&bytes).unwrap_err();
    assert!(err.is_format_error());
}

#[test]
fn test_me3_full_file_decompression() {
    let mut package = sample(MeGame::Me3, &[1000, 70_000]);
    let bytes = package
        .save_to_vec(&SaveOptions::compressed().with_compression(Some(CompressionType::Zlib)))
        .unwrap();

    let image = decompress_full_file_me3(&mut Cursor::new(&bytes)).unwrap();
    let opened = Package::from_bytes(&image).unwrap();
    assert!(opened.header().chunks.is_empty());
    assert_same_tables(&package, &opened);

    let mut plain = sample(MeGame::Me3, &[4]);
    let plain = plain.save_to_vec(&SaveOptions::new()).unwrap();
    assert!(matches!(
        decompress_full_file_me3(&mut Cursor::new(&plain)),
        Err(Error::NotCompressed)
    ));
}

#[test]
fn test_decompressed_stream() {
    let cook = vec!["SFXGame".to_string(), "Startup_INT".to_string()];
    let mut package = sample(MeGame::Me2, &[500, 80_000]);
    package.set_additional_packages_to_cook(cook.clone());
    let compressed = package.save_to_vec(&SaveOptions::compressed()).unwrap();
    assert_eq!(Package::from_bytes(&compressed).unwrap().additional_packages_to_cook(), cook.as_slice());

    let kept = Package::decompressed_stream(&compressed, false).unwrap();
    let opened = Package::from_bytes(&kept).unwrap();
    assert!(!opened.is_compressed_on_disk());
    assert_eq!(opened.additional_packages_to_cook(), cook.as_slice());
    assert_same_tables(&package, &opened);

    let mixin = Package::decompressed_stream(&compressed, true).unwrap();
    let opened = Package::from_bytes(&mixin).unwrap();
    assert!(!opened.is_compressed_on_disk());
    assert!(opened.additional_packages_to_cook().is_empty());
    assert_same_tables(&package, &opened);
}

#[test]
fn test_mixin_rules_keep_list_of_uncompressed_source() {
    let cook = vec!["SFXGame".to_string()];
    let mut package = sample(MeGame::Me3, &[64]);
    package.set_additional_packages_to_cook(cook.clone());
    let plain = package.save_to_vec(&SaveOptions::new()).unwrap();

    let bytes = Package::decompressed_stream(&plain, true).unwrap();
    let opened = Package::from_bytes(&bytes).unwrap();
    assert_eq!(opened.additional_packages_to_cook(), cook.as_slice());
}
