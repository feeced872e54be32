use crate::core::error::{DbpfError, Result};
use crate::core::stream::{ByteReader, ByteWriter};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAGIC: [u8; 4] = *b"DBPF";
pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 0;
pub const INDEX_VERSION_MAJOR: u32 = 7;
pub const INDEX_VERSION_MINOR: u32 = 0;

/// Size of the container header in bytes
pub const HEADER_SIZE: usize = 96;

/// Size of one index table entry (type, group, instance, offset, size)
pub const INDEX_ENTRY_SIZE: usize = 20;

/// Composite type/group/instance key of a container entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tgi {
    pub type_id: u32,
    pub group_id: u32,
    pub instance_id: u32,
}

impl Tgi {
    pub const fn new(type_id: u32, group_id: u32, instance_id: u32) -> Self {
        Tgi {
            type_id,
            group_id,
            instance_id,
        }
    }
}

impl fmt::Display for Tgi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:08x}-{:08x}",
            self.type_id, self.group_id, self.instance_id
        )
    }
}

/// DBPF container header
///
/// Occupies the first 96 bytes of the file. Only the index fields change
/// between saves; everything else is carried over from the loaded file so
/// that an unmodified container is written back byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Format version (major)
    pub version_major: u32,

    /// Format version (minor)
    pub version_minor: u32,

    /// Producer specific version and flag words
    pub user_version_major: u32,
    pub user_version_minor: u32,
    pub flags: u32,

    /// Unix timestamps
    pub created: u32,
    pub modified: u32,

    /// Index table version
    pub index_version_major: u32,
    pub index_version_minor: u32,

    /// Number of entries in the index table
    pub index_count: u32,

    /// Byte offset of the index table
    pub index_offset: u32,

    /// Byte length of the index table
    pub index_size: u32,

    /// Hole table, read but never rewritten
    pub hole_count: u32,
    pub hole_offset: u32,
    pub hole_size: u32,

    #[serde(skip, default = "default_reserved")]
    pub reserved: [u8; 32],
}

fn default_reserved() -> [u8; 32] {
    [0u8; 32]
}

impl Default for Header {
    fn default() -> Self {
        Header::new()
    }
}

impl Header {
    /// Create a new header with default values
    pub fn new() -> Self {
        Header {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            user_version_major: 0,
            user_version_minor: 0,
            flags: 0,
            created: 0,
            modified: 0,
            index_version_major: INDEX_VERSION_MAJOR,
            index_version_minor: INDEX_VERSION_MINOR,
            index_count: 0,
            index_offset: 0,
            index_size: 0,
            hole_count: 0,
            hole_offset: 0,
            hole_size: 0,
            reserved: [0; 32],
        }
    }

    /// Validate the versions this crate can read
    pub fn validate(&self) -> Result<()> {
        if self.version_major != VERSION_MAJOR {
            return Err(DbpfError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.index_version_major != INDEX_VERSION_MAJOR
            || self.index_version_minor != INDEX_VERSION_MINOR
        {
            return Err(DbpfError::UnsupportedIndexVersion {
                major: self.index_version_major,
                minor: self.index_version_minor,
            });
        }

        Ok(())
    }

    /// Validate that the index table lies within a buffer of `len` bytes
    pub fn validate_index(&self, len: usize) -> Result<()> {
        let expected = self.index_count as u64 * INDEX_ENTRY_SIZE as u64;
        let end = self.index_offset as u64 + expected;
        if (self.index_count > 0 && (self.index_offset as usize) < HEADER_SIZE) || end > len as u64 {
            return Err(DbpfError::DirectoryOutOfBounds {
                offset: self.index_offset,
                size: expected.min(u32::MAX as u64) as u32,
                len,
            });
        }
        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(HEADER_SIZE);
        w.bytes(&MAGIC)?;
        for value in [
            self.version_major,
            self.version_minor,
            self.user_version_major,
            self.user_version_minor,
            self.flags,
            self.created,
            self.modified,
            self.index_version_major,
            self.index_count,
            self.index_offset,
            self.index_size,
            self.hole_count,
            self.hole_offset,
            self.hole_size,
            self.index_version_minor,
        ] {
            w.u32(value)?;
        }
        w.bytes(&self.reserved)?;
        Ok(w.into_inner())
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic: [u8; 4] = r.array()?;
        if magic != MAGIC {
            return Err(DbpfError::InvalidSignature(magic));
        }
        if bytes.len() < HEADER_SIZE {
            return Err(DbpfError::UnexpectedEof {
                position: bytes.len(),
                needed: HEADER_SIZE - bytes.len(),
            });
        }

        let header = Header {
            version_major: r.u32()?,
            version_minor: r.u32()?,
            user_version_major: r.u32()?,
            user_version_minor: r.u32()?,
            flags: r.u32()?,
            created: r.u32()?,
            modified: r.u32()?,
            index_version_major: r.u32()?,
            index_count: r.u32()?,
            index_offset: r.u32()?,
            index_size: r.u32()?,
            hole_count: r.u32()?,
            hole_offset: r.u32()?,
            hole_size: r.u32()?,
            index_version_minor: r.u32()?,
            reserved: r.array()?,
        };
        header.validate()?;
        Ok(header)
    }
}

/// One row of the index table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub tgi: Tgi,
    pub offset: u32,
    pub size: u32,
}

impl IndexEntry {
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(IndexEntry {
            tgi: Tgi::new(r.u32()?, r.u32()?, r.u32()?),
            offset: r.u32()?,
            size: r.u32()?,
        })
    }

    pub fn write(&self, w: &mut ByteWriter) -> Result<()> {
        w.u32(self.tgi.type_id)?;
        w.u32(self.tgi.group_id)?;
        w.u32(self.tgi.instance_id)?;
        w.u32(self.offset)?;
        w.u32(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new();
        header.created = 1_700_000_000;
        header.index_count = 3;
        header.index_offset = 512;
        header.index_size = 60;
        header.reserved[31] = 0xAA;

        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"DBPF");
        assert_eq!(&bytes[36..40], &3u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &512u32.to_le_bytes());

        let decoded = Header::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = Header::new().to_bytes().unwrap();
        bytes[0..4].copy_from_slice(b"DBPX");
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(DbpfError::InvalidSignature(m)) if &m == b"DBPX"
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut header = Header::new();
        header.version_major = 2;
        let bytes = header.to_bytes().unwrap();
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(DbpfError::UnsupportedVersion { major: 2, .. })
        ));
    }

    #[test]
    fn test_index_bounds() {
        let mut header = Header::new();
        header.index_count = 4;
        header.index_offset = 96;
        assert!(header.validate_index(96 + 80).is_ok());
        assert!(matches!(
            header.validate_index(96 + 79),
            Err(DbpfError::DirectoryOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_tgi_display() {
        let tgi = Tgi::new(0xE86B1EEF, 0xE86B1EEF, 0x286B1F03);
        assert_eq!(tgi.to_string(), "e86b1eef-e86b1eef-286b1f03");
    }
}
