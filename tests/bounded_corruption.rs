//! Corruption detection tests
//!
//! Damage to one entry must surface as an error for that entry only; the rest
//! of the container stays readable and saves carry the damaged bytes through.

mod common;

use common::{city_bytes, tgi, uncompressed, uncompressed_city_bytes, LOT_MEMS};
use sc4_dbpf::core::header::HEADER_SIZE;
use sc4_dbpf::{Config, Dbpf, DbpfError, ErrorKind, FileType, LotFile, Savegame};

/// Byte range of an entry's stored payload
fn span(bytes: &[u8], file_type: FileType) -> (usize, usize) {
    let dbpf = Dbpf::from_bytes(bytes).unwrap();
    let entry = dbpf.find(tgi(file_type)).unwrap();
    (entry.offset() as usize, entry.size() as usize)
}

#[test]
fn test_bad_signature() {
    let mut bytes = city_bytes(64);
    bytes[0..4].copy_from_slice(b"DBPX");

    let err = Dbpf::from_bytes(&bytes).err().unwrap();
    assert!(matches!(err, DbpfError::InvalidSignature(_)));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_truncated_header() {
    let bytes = city_bytes(64);
    let err = Dbpf::from_bytes(&bytes[..HEADER_SIZE - 1]).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_truncated_index_table() {
    let bytes = city_bytes(64);
    let err = Dbpf::from_bytes(&bytes[..bytes.len() - 10]).err().unwrap();
    assert!(matches!(err, DbpfError::DirectoryOutOfBounds { .. }));
}

#[test]
fn test_unsupported_version() {
    let mut bytes = city_bytes(64);
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
    let err = Dbpf::from_bytes(&bytes).err().unwrap();
    assert!(matches!(err, DbpfError::UnsupportedVersion { major: 2, .. }));
}

#[test]
fn test_malformed_record_is_isolated() {
    let mut bytes = uncompressed_city_bytes(64);
    let (offset, _) = span(&bytes, FileType::Lot);
    // Size field of the first lot now claims more than the entry holds
    bytes[offset..offset + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

    let mut city = Savegame::from_bytes(&bytes).unwrap();
    let err = city.lots().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(matches!(
        err,
        DbpfError::Record { type_id, .. } if type_id == FileType::Lot.id()
    ));

    assert_eq!(city.com_serializer().unwrap().get(FileType::Lot.id()), Some(3));
    assert_eq!(city.zone_developer().unwrap().cells.x_size(), 64);

    // The damaged entry is written back untouched
    assert_eq!(city.to_bytes().unwrap(), bytes);
}

#[test]
fn test_corrupt_compressed_stream() {
    let mut bytes = city_bytes(256);
    let (offset, _) = span(&bytes, FileType::ZoneDeveloper);
    // Low byte of the declared decompressed size
    bytes[offset + 8] ^= 0x01;

    let mut city = Savegame::from_bytes(&bytes).unwrap();
    let err = city.zone_developer().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Codec);
    assert!(city.lots().is_ok());
}

#[test]
fn test_stale_checksum_is_reported_and_repaired() {
    let mut bytes = uncompressed_city_bytes(64);
    let (offset, _) = span(&bytes, FileType::Lot);
    let first = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
    // Last tail byte of the first lot
    bytes[offset + first - 1] ^= 0xFF;

    let mut city = Savegame::from_bytes(&bytes).unwrap();
    let failures = city.lots().unwrap().checksum_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].mem, LOT_MEMS[0]);

    // Saving re-seals the record and keeps its content
    let saved = city.to_bytes().unwrap();
    let mut reloaded = Savegame::from_bytes(&saved).unwrap();
    let lots: &LotFile = reloaded.lots().unwrap();
    assert!(lots.checksum_failures().is_empty());
    assert_eq!(lots[0].tail.last(), Some(&(0x11 ^ 0xFF)));
}

#[test]
fn test_strict_checksums_reject_stale_records() {
    let mut bytes = uncompressed_city_bytes(64);
    let (offset, size) = span(&bytes, FileType::Lot);
    bytes[offset + size - 1] ^= 0xFF;

    let config = Config {
        strict_checksums: true,
        ..uncompressed()
    };
    let mut city = Savegame::from_bytes_with(&bytes, config).unwrap();
    let err = city.lots().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Checksum);
    assert!(matches!(
        err,
        DbpfError::Record { source, .. }
            if matches!(*source, DbpfError::ChecksumMismatch { mem, .. } if mem == LOT_MEMS[2])
    ));
}
