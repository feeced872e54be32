use crate::core::compression::{self, CompressionConfig, CompressionMethod};
use crate::core::error::{DbpfError, Result};
use crate::core::header::Tgi;
use crate::core::subfile::{self, Record, Subfile};
use serde::Serialize;
use tracing::{debug, warn};

/// Where an entry is in its load / edit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryState {
    /// Only the stored bytes are held
    Unloaded,
    /// The decompressed payload is cached
    Decompressed,
    /// The record is decoded and matches the stored bytes
    Decoded,
    /// The record was handed out mutably since the last save
    Dirty,
}

/// One directory entry of a container
///
/// Holds the stored bytes exactly as they appear in the file and memoises the
/// decompressed payload and the decoded record.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) tgi: Tgi,
    pub(crate) offset: u32,
    pub(crate) size: u32,
    /// Present when the entry is listed in the `DIR` record
    pub(crate) decompressed_size: Option<u32>,
    pub(crate) raw: Vec<u8>,
    pub(crate) buffer: Option<Vec<u8>>,
    pub(crate) record: Option<Record>,
    pub(crate) dirty: bool,
    /// Bumped on every mutable access; the container compares the sum
    /// against the stamp of its item index
    pub(crate) edits: u64,
    /// `None` for entries added since the last save
    pub(crate) compression: Option<CompressionMethod>,
    pub(crate) strict_checksums: bool,
}

/// Stored form of an entry computed while building a save image
pub(crate) enum Payload {
    /// Reuse `raw` as is
    Stored,
    Fresh {
        bytes: Vec<u8>,
        encoded: Vec<u8>,
        method: CompressionMethod,
    },
}

impl Entry {
    /// Entry read from a container
    pub(crate) fn loaded(tgi: Tgi, offset: u32, raw: Vec<u8>) -> Self {
        Entry {
            tgi,
            offset,
            size: raw.len() as u32,
            decompressed_size: None,
            raw,
            buffer: None,
            record: None,
            dirty: false,
            edits: 0,
            compression: Some(CompressionMethod::None),
            strict_checksums: false,
        }
    }

    /// New entry holding a decoded record; compression is decided at save
    pub(crate) fn from_record(tgi: Tgi, record: Record) -> Result<Self> {
        let encoded = record.encode()?;
        Ok(Entry {
            tgi,
            offset: 0,
            size: encoded.len() as u32,
            decompressed_size: None,
            raw: encoded.clone(),
            buffer: Some(encoded),
            record: Some(record),
            dirty: true,
            edits: 0,
            compression: None,
            strict_checksums: false,
        })
    }

    pub(crate) fn mark_compressed(&mut self, decompressed_size: u32) {
        self.decompressed_size = Some(decompressed_size);
        self.compression = Some(CompressionMethod::Qfs);
    }

    pub fn tgi(&self) -> Tgi {
        self.tgi
    }

    pub fn type_id(&self) -> u32 {
        self.tgi.type_id
    }

    /// Offset of the stored bytes in the file they were last read from or written to
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Stored (possibly compressed) size
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_compressed(&self) -> bool {
        self.decompressed_size.is_some()
    }

    pub fn decompressed_size(&self) -> Option<u32> {
        self.decompressed_size
    }

    /// Stored bytes as they appear in the file
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn state(&self) -> EntryState {
        match (&self.record, &self.buffer) {
            (Some(_), _) if self.dirty => EntryState::Dirty,
            (Some(_), _) => EntryState::Decoded,
            (None, Some(_)) => EntryState::Decompressed,
            (None, None) => EntryState::Unloaded,
        }
    }

    fn context(&self, source: DbpfError) -> DbpfError {
        DbpfError::Record {
            type_id: self.tgi.type_id,
            offset: self.offset,
            source: Box::new(source),
        }
    }

    fn inflate(&self) -> Result<Vec<u8>> {
        match self.decompressed_size {
            Some(size) => compression::decompress(&self.raw, size as usize)
                .map_err(|e| self.context(e)),
            None => Ok(self.raw.clone()),
        }
    }

    /// Decompressed payload, computed once
    pub fn decompress(&mut self) -> Result<&[u8]> {
        let buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => self.inflate()?,
        };
        Ok(self.buffer.insert(buffer))
    }

    fn decode(&mut self) -> Result<Record> {
        self.decompress()?;
        let bytes = self.buffer.as_deref().unwrap_or_default();
        let record = subfile::decode(self.tgi.type_id, bytes).map_err(|e| self.context(e))?;

        let failures = record.checksum_failures();
        if let Some(first) = failures.first() {
            if self.strict_checksums {
                return Err(self.context(DbpfError::ChecksumMismatch {
                    mem: first.mem,
                    stored: first.stored,
                    computed: first.computed,
                }));
            }
            warn!(
                "Entry {} holds {} record(s) with stale checksums",
                self.tgi,
                failures.len()
            );
        }
        debug!("Decoded entry {} ({:?})", self.tgi, record.kind());
        Ok(record)
    }

    pub(crate) fn load(&mut self) -> Result<&mut Record> {
        let record = match self.record.take() {
            Some(record) => record,
            None => self.decode()?,
        };
        Ok(self.record.insert(record))
    }

    /// Decoded record, decoded once
    pub fn read(&mut self) -> Result<&Record> {
        self.load().map(|record| &*record)
    }

    /// Decoded record for editing; marks the entry dirty
    pub fn read_mut(&mut self) -> Result<&mut Record> {
        self.load()?;
        self.touch();
        self.load()
    }

    pub fn read_as<T: Subfile>(&mut self) -> Result<&T> {
        let found = self.tgi.type_id;
        let record = self.load()?;
        T::from_record(record).ok_or(DbpfError::TypeMismatch {
            expected: T::TYPE_ID,
            found,
        })
    }

    pub fn read_as_mut<T: Subfile>(&mut self) -> Result<&mut T> {
        let found = self.tgi.type_id;
        if T::from_record(self.load()?).is_none() {
            return Err(DbpfError::TypeMismatch {
                expected: T::TYPE_ID,
                found,
            });
        }
        self.touch();
        let record = self.load()?;
        T::from_record_mut(record).ok_or(DbpfError::TypeMismatch {
            expected: T::TYPE_ID,
            found,
        })
    }

    /// Replace the decoded record wholesale
    pub fn set_record(&mut self, record: Record) {
        self.record = Some(record);
        self.touch();
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.edits += 1;
    }

    fn has_stale_checksums(&self) -> bool {
        self.record
            .as_ref()
            .map_or(false, |r| !r.checksum_failures().is_empty())
    }

    /// Stored form for the next save
    pub(crate) fn payload(&mut self, config: &CompressionConfig) -> Result<Payload> {
        if !self.dirty && !self.has_stale_checksums() {
            return Ok(Payload::Stored);
        }

        let encoded = match self.record.as_ref().map(Record::encode) {
            Some(encoded) => encoded.map_err(|e| self.context(e))?,
            None => self.decompress()?.to_vec(),
        };

        let method = match self.compression {
            Some(method) => {
                if self.buffer.as_deref() == Some(&encoded[..]) {
                    return Ok(Payload::Stored);
                }
                method
            }
            None => {
                let (bytes, method) = compression::compress_if_beneficial(&encoded, config);
                return Ok(Payload::Fresh {
                    bytes,
                    encoded,
                    method,
                });
            }
        };

        let bytes = match method {
            CompressionMethod::Qfs => compression::compress_with(&encoded, config.max_chain),
            CompressionMethod::None => encoded.clone(),
        };
        Ok(Payload::Fresh {
            bytes,
            encoded,
            method,
        })
    }

    /// Adopt the stored form that was just written at `offset`
    pub(crate) fn commit(&mut self, offset: u32, payload: Payload) {
        self.offset = offset;
        self.dirty = false;
        if let Payload::Fresh {
            bytes,
            encoded,
            method,
        } = payload
        {
            self.decompressed_size = match method {
                CompressionMethod::Qfs => Some(encoded.len() as u32),
                CompressionMethod::None => None,
            };
            self.compression = Some(method);
            if self.record.is_some() {
                // Reload so decoded checksums describe the bytes on disk
                match subfile::decode(self.tgi.type_id, &encoded) {
                    Ok(record) => self.record = Some(record),
                    Err(e) => warn!(
                        "Entry {} did not decode after saving, keeping the edited record: {}",
                        self.tgi, e
                    ),
                }
            }
            self.raw = bytes;
            self.buffer = Some(encoded);
        }
        self.size = self.raw.len() as u32;
    }
}
