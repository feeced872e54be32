use super::{record_variant, FileType, Record, Subfile, SubfileKind};
use crate::core::error::{DbpfError, Result};
use crate::core::stream::{ByteReader, ByteWriter};
use serde::Serialize;

/// Instance counts per serialized type
///
/// The game checks these against the number of entities it actually finds,
/// so they must be updated whenever entities are added or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComSerializerFile {
    pub version: u32,
    counts: Vec<(u32, u32)>,
}

impl ComSerializerFile {
    pub fn new() -> Self {
        ComSerializerFile {
            version: 1,
            counts: Vec::new(),
        }
    }

    pub fn get(&self, type_id: u32) -> Option<u32> {
        self.counts
            .iter()
            .find(|(t, _)| *t == type_id)
            .map(|(_, count)| *count)
    }

    /// Update the count of `type_id`, appending it when absent
    pub fn set(&mut self, type_id: u32, count: u32) {
        match self.counts.iter_mut().find(|(t, _)| *t == type_id) {
            Some(entry) => entry.1 = count,
            None => self.counts.push((type_id, count)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.counts.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl Subfile for ComSerializerFile {
    const TYPE_ID: u32 = FileType::ComSerializer as u32;
    const KIND: SubfileKind = SubfileKind::ScalarState;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let version = r.u32()?;
        let count = r.count(8)?;
        let mut counts = Vec::with_capacity(count);
        for _ in 0..count {
            counts.push((r.u32()?, r.u32()?));
        }
        if !r.is_empty() {
            return Err(DbpfError::malformed(format!(
                "{} bytes after the last type count",
                r.remaining()
            )));
        }
        Ok(ComSerializerFile { version, counts })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(8 + 8 * self.counts.len());
        w.u32(self.version)?;
        w.u32(self.counts.len() as u32)?;
        for (type_id, count) in &self.counts {
            w.u32(*type_id)?;
            w.u32(*count)?;
        }
        Ok(w.into_inner())
    }

    record_variant!(ComSerializerFile, ComSerializer);
}
