//! Record header and entity lists
//!
//! Entity-list subfiles (lots, pipes) are plain concatenations of records.
//! Each record starts with a [`RecordHeader`] whose size field frames it, so
//! the list is decoded by walking size fields until the buffer is exhausted.

use super::{ChecksumFailure, Record, Subfile, SubfileKind};
use crate::core::checksum;
use crate::core::error::{DbpfError, Result};
use crate::core::stream::{ByteReader, ByteWriter};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use tracing::warn;

/// size (4) + crc (4) + mem (4) + major (2)
pub const RECORD_HEADER_SIZE: usize = 14;

/// Common prefix of addressed records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Checksum as stored when decoded; recomputed on every encode
    pub crc: u32,

    /// Save-file unique address, 0 until assigned
    pub mem: u32,

    pub major: u16,

    /// Checksum computed over the decoded bytes
    #[serde(skip)]
    computed: Option<u32>,
}

impl RecordHeader {
    pub fn new(major: u16) -> Self {
        RecordHeader {
            major,
            ..Default::default()
        }
    }

    /// Read the header of a record spanning all of `bytes`
    pub fn read(r: &mut ByteReader<'_>, bytes: &[u8]) -> Result<Self> {
        let size = r.u32()? as usize;
        if size != bytes.len() {
            return Err(DbpfError::malformed(format!(
                "record size field {} does not match its {} bytes",
                size,
                bytes.len()
            )));
        }
        let crc = r.u32()?;
        let mem = r.u32()?;
        let major = r.u16()?;
        let computed = checksum::compute_record(bytes);
        if computed != crc {
            warn!(
                "Checksum mismatch for mem {:#010x}: stored {:#010x}, computed {:#010x}",
                mem, crc, computed
            );
        }
        Ok(RecordHeader {
            crc,
            mem,
            major,
            computed: Some(computed),
        })
    }

    /// Start a record: placeholders for size and checksum, then mem and major
    pub fn begin(&self) -> Result<ByteWriter> {
        let mut w = ByteWriter::new();
        w.u32(0)?;
        w.u32(0)?;
        w.u32(self.mem)?;
        w.u16(self.major)?;
        Ok(w)
    }

    /// Patch the size field and seal the checksum
    pub fn finish(w: ByteWriter) -> Vec<u8> {
        let mut bytes = w.into_inner();
        let size = bytes.len() as u32;
        bytes[0..4].copy_from_slice(&size.to_le_bytes());
        checksum::seal(&mut bytes);
        bytes
    }

    pub fn checksum_ok(&self) -> bool {
        self.computed.map_or(true, |c| c == self.crc)
    }

    pub fn failure(&self) -> Option<ChecksumFailure> {
        match self.computed {
            Some(computed) if computed != self.crc => Some(ChecksumFailure {
                mem: self.mem,
                stored: self.crc,
                computed,
            }),
            _ => None,
        }
    }
}

/// One addressed record inside an entity list
pub trait Entity: Sized {
    const TYPE_ID: u32;

    /// Decode one record; `bytes` spans exactly the record
    fn decode(bytes: &[u8]) -> Result<Self>;
    fn encode(&self) -> Result<Vec<u8>>;

    fn header(&self) -> &RecordHeader;
    fn header_mut(&mut self) -> &mut RecordHeader;

    fn mem(&self) -> u32 {
        self.header().mem
    }

    fn wrap(list: EntityList<Self>) -> Record;
    fn unwrap(record: &Record) -> Option<&EntityList<Self>>;
    fn unwrap_mut(record: &mut Record) -> Option<&mut EntityList<Self>>;
}

/// Ordered list of entities stored in one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityList<T> {
    items: Vec<T>,
}

impl<T> Default for EntityList<T> {
    fn default() -> Self {
        EntityList { items: Vec::new() }
    }
}

impl<T> Deref for EntityList<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.items
    }
}

impl<T> DerefMut for EntityList<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }
}

impl<T> From<Vec<T>> for EntityList<T> {
    fn from(items: Vec<T>) -> Self {
        EntityList { items }
    }
}

impl<T: Entity> EntityList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find an entity by mem address
    pub fn by_mem(&self, mem: u32) -> Option<&T> {
        self.items.iter().find(|item| item.mem() == mem)
    }

    pub(crate) fn addresses_mut(&mut self) -> Vec<(Option<usize>, &mut u32)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(i, item)| (Some(i), &mut item.header_mut().mem))
            .collect()
    }

    /// Records whose stored checksum did not match their bytes when decoded
    pub fn checksum_failures(&self) -> Vec<ChecksumFailure> {
        self.items
            .iter()
            .filter_map(|item| item.header().failure())
            .collect()
    }
}

impl<T: Entity> Subfile for EntityList<T> {
    const TYPE_ID: u32 = T::TYPE_ID;
    const KIND: SubfileKind = SubfileKind::EntityList;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut items = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let rest = &bytes[offset..];
            let size = match rest.get(0..4) {
                Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize,
                None => {
                    return Err(DbpfError::malformed(format!(
                        "{} trailing bytes at {} cannot hold a record",
                        rest.len(),
                        offset
                    )))
                }
            };
            if size < RECORD_HEADER_SIZE || size > rest.len() {
                return Err(DbpfError::malformed(format!(
                    "record #{} at {} declares {} bytes with {} left",
                    items.len(),
                    offset,
                    size,
                    rest.len()
                )));
            }
            items.push(T::decode(&rest[..size])?);
            offset += size;
        }
        Ok(EntityList { items })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for item in &self.items {
            out.extend_from_slice(&item.encode()?);
        }
        Ok(out)
    }

    fn from_record(record: &Record) -> Option<&Self> {
        T::unwrap(record)
    }

    fn from_record_mut(record: &mut Record) -> Option<&mut Self> {
        T::unwrap_mut(record)
    }

    fn into_record(self) -> Record {
        T::wrap(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip_and_seal() {
        let mut header = RecordHeader::new(3);
        header.mem = 0x1234;
        let mut w = header.begin().unwrap();
        w.u32(0xCAFEBABE).unwrap();
        let bytes = RecordHeader::finish(w);
        assert_eq!(bytes.len(), RECORD_HEADER_SIZE + 4);
        assert!(checksum::verify(&bytes));

        let mut r = ByteReader::new(&bytes);
        let decoded = RecordHeader::read(&mut r, &bytes).unwrap();
        assert_eq!(decoded.mem, 0x1234);
        assert_eq!(decoded.major, 3);
        assert!(decoded.checksum_ok());
        assert_eq!(decoded.failure(), None);
    }

    #[test]
    fn test_stale_checksum_is_reported_not_fatal() {
        let mut w = RecordHeader::new(1).begin().unwrap();
        w.u32(7).unwrap();
        let mut bytes = RecordHeader::finish(w);
        bytes[14] ^= 0x01;

        let mut r = ByteReader::new(&bytes);
        let decoded = RecordHeader::read(&mut r, &bytes).unwrap();
        assert!(!decoded.checksum_ok());
        let failure = decoded.failure().unwrap();
        assert_eq!(failure.stored, decoded.crc);
        assert_eq!(failure.computed, checksum::compute_record(&bytes));
    }

    #[test]
    fn test_size_field_must_match() {
        let mut w = RecordHeader::new(1).begin().unwrap();
        w.u32(7).unwrap();
        let bytes = RecordHeader::finish(w);
        let mut r = ByteReader::new(&bytes[..bytes.len() - 1]);
        assert!(RecordHeader::read(&mut r, &bytes[..bytes.len() - 1]).is_err());
    }
}
