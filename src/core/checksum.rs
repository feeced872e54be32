//! Record checksums
//!
//! Every record that starts with a [`RecordHeader`](crate::core::subfile::RecordHeader)
//! stores a 32-bit checksum at byte 4. It is a CRC-32 with polynomial
//! `0x04C11DB7`, processed MSB first, seeded with `0xFFFFFFFF` and without a
//! final xor. It covers the record bytes after the size and checksum fields,
//! but never more than the first [`CHECKSUM_WINDOW`] of them.

use crc::{Crc, CRC_32_MPEG_2};

/// Number of payload bytes the game feeds into the checksum.
pub const CHECKSUM_WINDOW: usize = 250_000;

const SEED: u32 = 0xFFFF_FFFF;

/// Offset of the first checksummed byte within a record.
pub const PAYLOAD_OFFSET: usize = 8;

const RECORD_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Compute the checksum of a record payload (the bytes after the checksum field).
pub fn compute(payload: &[u8]) -> u32 {
    let end = payload.len().min(CHECKSUM_WINDOW);
    RECORD_CRC.checksum(&payload[..end])
}

/// Compute the checksum of a complete serialized record.
pub fn compute_record(record: &[u8]) -> u32 {
    record.get(PAYLOAD_OFFSET..).map_or(SEED, compute)
}

/// Read the checksum stored in a serialized record.
pub fn stored(record: &[u8]) -> Option<u32> {
    let bytes = record.get(4..8)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Check the stored checksum of a serialized record against its payload.
///
/// Diagnostic only: a mismatch never prevents a record from loading.
pub fn verify(record: &[u8]) -> bool {
    stored(record) == Some(compute_record(record))
}

/// Overwrite the stored checksum of a serialized record in place.
pub fn seal(record: &mut [u8]) {
    if record.len() < PAYLOAD_OFFSET {
        return;
    }
    let value = compute_record(record);
    record[4..8].copy_from_slice(&value.to_le_bytes());
}
