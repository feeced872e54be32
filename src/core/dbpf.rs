//! DBPF container
//!
//! Loads the header and index table, keeps every entry's stored bytes and
//! writes containers back in canonical layout: header, payloads in directory
//! order starting right after the header, index table last.
//!
//! A save is assembled completely in memory before the first byte reaches
//! the sink. Entry offsets and stored bytes are only updated once the sink
//! reported success, so a failed save leaves the container as it was.

use crate::core::compression::{self, CompressionMethod};
use crate::core::config::Config;
use crate::core::entry::{Entry, Payload};
use crate::core::error::{DbpfError, Result};
use crate::core::header::{Header, IndexEntry, Tgi, HEADER_SIZE, INDEX_ENTRY_SIZE};
use crate::core::index::{AddressSlot, ItemIndex, ItemRef};
use crate::core::io;
use crate::core::pointer::Pointer;
use crate::core::stream::{ByteReader, ByteWriter};
use crate::core::subfile::{self, Record, Subfile, DIRECTORY_TGI};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Size of one `DIR` row: type, group, instance, decompressed size
const DIR_ROW_SIZE: usize = 16;

pub struct Dbpf {
    header: Header,
    entries: Vec<Entry>,
    config: Config,
    /// Item index and the edit stamp it was built at
    index: Option<(ItemIndex, u64)>,
    /// Structure changes plus the edits of entries no longer held, so the
    /// edit stamp never decreases
    structure_edits: u64,
    structure_dirty: bool,
}

/// A fully assembled save, not yet committed to the container
pub struct SaveImage {
    bytes: Vec<u8>,
    header: Header,
    offsets: Vec<u32>,
    payloads: Vec<Payload>,
    directory: Option<Entry>,
}

impl SaveImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for Dbpf {
    fn default() -> Self {
        Dbpf::new()
    }
}

impl Dbpf {
    /// Empty container with a fresh header
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let now = chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        let mut header = Header::new();
        header.created = now;
        header.modified = now;
        Dbpf {
            header,
            entries: Vec::new(),
            config,
            index: None,
            structure_edits: 0,
            structure_dirty: true,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with(bytes, Config::default())
    }

    pub fn from_bytes_with(bytes: &[u8], config: Config) -> Result<Self> {
        let header = Header::from_bytes(bytes)?;
        header.validate_index(bytes.len())?;

        let table_start = header.index_offset as usize;
        let table_end = table_start + header.index_count as usize * INDEX_ENTRY_SIZE;
        let mut r = ByteReader::new(&bytes[table_start..table_end]);

        let mut entries = Vec::with_capacity(header.index_count as usize);
        for _ in 0..header.index_count {
            let row = IndexEntry::read(&mut r)?;
            let start = row.offset as usize;
            let end = start + row.size as usize;
            if end > bytes.len() {
                return Err(DbpfError::EntryOutOfBounds {
                    tgi: row.tgi,
                    offset: row.offset,
                    size: row.size,
                    len: bytes.len(),
                });
            }
            let mut entry = Entry::loaded(row.tgi, row.offset, bytes[start..end].to_vec());
            entry.strict_checksums = config.strict_checksums;
            entries.push(entry);
        }

        let mut dbpf = Dbpf {
            header,
            entries,
            config,
            index: None,
            structure_edits: 0,
            structure_dirty: false,
        };
        dbpf.apply_directory()?;

        info!(
            "Loaded DBPF: {} entries, {} compressed",
            dbpf.entries.len(),
            dbpf.entries.iter().filter(|e| e.is_compressed()).count()
        );
        Ok(dbpf)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(&io::read(path)?)
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        Self::from_bytes_with(&io::read(path)?, config)
    }

    /// Mark the entries listed in the `DIR` record as compressed
    fn apply_directory(&mut self) -> Result<()> {
        let rows = match self.entries.iter().find(|e| e.tgi == DIRECTORY_TGI) {
            Some(dir) => parse_directory(dir.raw())?,
            None => return Ok(()),
        };
        for entry in &mut self.entries {
            if entry.tgi == DIRECTORY_TGI {
                continue;
            }
            match rows.get(&entry.tgi) {
                Some(&size) if compression::is_compressed(entry.raw()) => {
                    entry.mark_compressed(size)
                }
                Some(_) => warn!(
                    "Entry {} is listed as compressed but has no QFS header",
                    entry.tgi
                ),
                None => {}
            }
        }
        Ok(())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entries in directory order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, tgi: Tgi) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tgi == tgi)
    }

    pub fn find_mut(&mut self, tgi: Tgi) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.tgi == tgi)
    }

    /// First entry of a type
    pub fn find_by_type(&self, type_id: u32) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tgi.type_id == type_id)
    }

    pub fn find_by_type_mut(&mut self, type_id: u32) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.tgi.type_id == type_id)
    }

    pub fn filter_by_type(&self, type_id: u32) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(move |e| e.tgi.type_id == type_id)
    }

    pub fn filter_by_type_mut(&mut self, type_id: u32) -> impl Iterator<Item = &mut Entry> {
        self.entries
            .iter_mut()
            .filter(move |e| e.tgi.type_id == type_id)
    }

    /// Decoded record of the first entry holding a `T`
    pub fn subfile<T: Subfile>(&mut self) -> Result<Option<&T>> {
        match self.find_by_type_mut(T::TYPE_ID) {
            Some(entry) => entry.read_as::<T>().map(Some),
            None => Ok(None),
        }
    }

    pub fn subfile_mut<T: Subfile>(&mut self) -> Result<Option<&mut T>> {
        match self.find_by_type_mut(T::TYPE_ID) {
            Some(entry) => entry.read_as_mut::<T>().map(Some),
            None => Ok(None),
        }
    }

    /// Append an entry holding `record`, replacing any entry with the same key
    pub fn add(&mut self, tgi: Tgi, record: Record) -> Result<&mut Entry> {
        let mut entry = Entry::from_record(tgi, record)?;
        entry.strict_checksums = self.config.strict_checksums;
        Ok(self.insert(entry))
    }

    /// Append an entry whose payload is stored uncompressed as given
    pub fn add_raw(&mut self, tgi: Tgi, bytes: Vec<u8>) -> &mut Entry {
        let mut entry = Entry::loaded(tgi, 0, bytes);
        entry.strict_checksums = self.config.strict_checksums;
        self.insert(entry)
    }

    fn insert(&mut self, entry: Entry) -> &mut Entry {
        let position = match self.entries.iter().position(|e| e.tgi == entry.tgi) {
            Some(i) => {
                let replaced = std::mem::replace(&mut self.entries[i], entry);
                self.structure_changed(replaced.edits);
                i
            }
            None => {
                self.structure_changed(0);
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position]
    }

    pub fn remove(&mut self, tgi: Tgi) -> Option<Entry> {
        let position = self.entries.iter().position(|e| e.tgi == tgi)?;
        let removed = self.entries.remove(position);
        self.structure_changed(removed.edits);
        Some(removed)
    }

    fn structure_changed(&mut self, retired_edits: u64) {
        self.structure_dirty = true;
        self.structure_edits = self
            .structure_edits
            .wrapping_add(retired_edits)
            .wrapping_add(1);
    }

    fn stamp(&self) -> u64 {
        self.entries
            .iter()
            .fold(self.structure_edits, |acc, e| acc.wrapping_add(e.edits))
    }

    /// Whether anything changed since the container was loaded or saved
    pub fn is_dirty(&self) -> bool {
        self.structure_dirty || self.entries.iter().any(|e| e.dirty)
    }

    /// The item index, if no record was handed out mutably since it was built
    pub fn index(&self) -> Option<&ItemIndex> {
        match &self.index {
            Some((index, stamp)) if *stamp == self.stamp() => Some(index),
            _ => None,
        }
    }

    /// Decode every addressable record, assign missing addresses and check pointers
    pub fn rebuild_index(&mut self) -> Result<&ItemIndex> {
        for entry in &mut self.entries {
            if subfile::is_addressable(entry.tgi.type_id) {
                entry.load()?;
            }
        }

        let mut slots = Vec::new();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            let type_id = entry.tgi.type_id;
            if let Some(record) = entry.record.as_mut() {
                for (item, mem) in record.addresses_mut() {
                    slots.push(AddressSlot {
                        type_id,
                        entry: i,
                        item,
                        mem,
                    });
                }
            }
        }
        let index = ItemIndex::rebuild(slots)?;

        for i in index.touched() {
            self.entries[i].dirty = true;
        }

        let pointers: Vec<_> = self
            .entries
            .iter()
            .filter_map(|e| e.record.as_ref())
            .flat_map(|r| r.pointers())
            .collect();
        index.validate(&pointers)?;
        debug!("Validated {} pointer slots", pointers.len());

        let stamp = self.stamp();
        Ok(&self.index.insert((index, stamp)).0)
    }

    /// Resolve a pointer to the record it names, rebuilding the index if stale
    pub fn resolve(&mut self, pointer: &Pointer) -> Result<Option<ItemRef>> {
        if self.index().is_none() {
            self.rebuild_index()?;
        }
        Ok(self.index().and_then(|index| index.resolve(pointer)))
    }

    /// Assemble the bytes of the next save without touching entry state
    pub fn build(&mut self) -> Result<SaveImage> {
        if self.is_dirty() {
            self.rebuild_index()?;
        }

        let policy = self.config.compression.clone();
        let mut payloads = Vec::with_capacity(self.entries.len());
        for entry in &mut self.entries {
            if entry.tgi == DIRECTORY_TGI {
                payloads.push(Payload::Stored);
            } else {
                payloads.push(entry.payload(&policy)?);
            }
        }

        // Rows of the directory record as they will be written
        let mut rows = BTreeMap::new();
        for (entry, payload) in self.entries.iter().zip(&payloads) {
            let size = match payload {
                Payload::Stored => entry.decompressed_size,
                Payload::Fresh {
                    encoded, method, ..
                } => (*method == CompressionMethod::Qfs).then_some(encoded.len() as u32),
            };
            if let Some(size) = size {
                rows.insert(entry.tgi, size);
            }
        }

        // Stored rows naming absent entries are carried until something changes
        let reencoded = payloads.iter().any(|p| matches!(p, Payload::Fresh { .. }));
        let directory_current = !self.structure_dirty && !reencoded;

        let mut directory = None;
        match self.entries.iter().position(|e| e.tgi == DIRECTORY_TGI) {
            Some(_) if directory_current => {}
            Some(i) => {
                let stored = parse_directory(self.entries[i].raw())?;
                if stored != rows {
                    let bytes = encode_directory(&self.entries, &rows)?;
                    payloads[i] = Payload::Fresh {
                        encoded: bytes.clone(),
                        bytes,
                        method: CompressionMethod::None,
                    };
                }
            }
            None if !rows.is_empty() => {
                let bytes = encode_directory(&self.entries, &rows)?;
                directory = Some(Entry::loaded(DIRECTORY_TGI, 0, bytes));
            }
            None => {}
        }

        let mut header = self.header.clone();
        if self.config.touch_modified {
            header.modified = chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        }

        let mut out = vec![0u8; HEADER_SIZE];
        let mut offsets = Vec::with_capacity(self.entries.len() + 1);
        let mut table = ByteWriter::with_capacity((self.entries.len() + 1) * INDEX_ENTRY_SIZE);
        let stored = self.entries.iter().zip(&payloads).map(|(entry, payload)| {
            let bytes = match payload {
                Payload::Stored => entry.raw(),
                Payload::Fresh { bytes, .. } => bytes.as_slice(),
            };
            (entry.tgi, bytes)
        });
        for (tgi, bytes) in stored.chain(directory.iter().map(|d| (d.tgi, d.raw()))) {
            let offset = u32::try_from(out.len())
                .map_err(|_| DbpfError::malformed("container exceeds 4 GiB"))?;
            out.extend_from_slice(bytes);
            offsets.push(offset);
            IndexEntry {
                tgi,
                offset,
                size: bytes.len() as u32,
            }
            .write(&mut table)?;
        }

        header.index_count = offsets.len() as u32;
        header.index_offset = out.len() as u32;
        header.index_size = table.len() as u32;
        header.hole_count = 0;
        header.hole_offset = 0;
        header.hole_size = 0;
        out.extend_from_slice(&table.into_inner());
        out[..HEADER_SIZE].copy_from_slice(&header.to_bytes()?);

        Ok(SaveImage {
            bytes: out,
            header,
            offsets,
            payloads,
            directory,
        })
    }

    /// Adopt a written image: offsets, stored bytes and clean state
    pub fn commit(&mut self, image: SaveImage) -> Vec<u8> {
        let SaveImage {
            bytes,
            header,
            offsets,
            payloads,
            directory,
        } = image;

        for ((entry, offset), payload) in self.entries.iter_mut().zip(&offsets).zip(payloads) {
            entry.commit(*offset, payload);
        }
        if let Some(mut dir) = directory {
            if let Some(offset) = offsets.last() {
                dir.offset = *offset;
            }
            self.entries.push(dir);
        }

        self.header = header;
        self.structure_dirty = false;
        info!(
            "Saved DBPF: {} entries, {} bytes",
            self.entries.len(),
            bytes.len()
        );
        bytes
    }

    /// Serialize the container, committing the result
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let image = self.build()?;
        Ok(self.commit(image))
    }

    pub fn save_to<W: Write>(&mut self, mut writer: W) -> Result<()> {
        let image = self.build()?;
        writer.write_all(image.bytes())?;
        writer.flush()?;
        self.commit(image);
        Ok(())
    }

    /// Atomically replace the file at `path`
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = self.build()?;
        io::write_atomic(&path, image.bytes())?;
        self.commit(image);
        Ok(())
    }

    #[cfg(feature = "async")]
    pub async fn save_async<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = self.build()?;
        io::write_atomic_async(&path, image.bytes()).await?;
        self.commit(image);
        Ok(())
    }
}

fn parse_directory(bytes: &[u8]) -> Result<BTreeMap<Tgi, u32>> {
    if bytes.len() % DIR_ROW_SIZE != 0 {
        return Err(DbpfError::Record {
            type_id: DIRECTORY_TGI.type_id,
            offset: 0,
            source: Box::new(DbpfError::malformed(format!(
                "directory of {} bytes is not a whole number of rows",
                bytes.len()
            ))),
        });
    }
    let mut r = ByteReader::new(bytes);
    let mut rows = BTreeMap::new();
    while !r.is_empty() {
        let tgi = Tgi::new(r.u32()?, r.u32()?, r.u32()?);
        rows.insert(tgi, r.u32()?);
    }
    Ok(rows)
}

/// Directory rows in directory order
fn encode_directory(entries: &[Entry], rows: &BTreeMap<Tgi, u32>) -> Result<Vec<u8>> {
    let mut w = ByteWriter::with_capacity(rows.len() * DIR_ROW_SIZE);
    for entry in entries {
        if let Some(size) = rows.get(&entry.tgi) {
            w.u32(entry.tgi.type_id)?;
            w.u32(entry.tgi.group_id)?;
            w.u32(entry.tgi.instance_id)?;
            w.u32(*size)?;
        }
    }
    Ok(w.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::subfile::{ComSerializerFile, FileType};

    fn com() -> Record {
        let mut com = ComSerializerFile::new();
        com.set(FileType::Lot.id(), 0);
        Record::ComSerializer(com)
    }

    #[test]
    fn test_empty_container() {
        let mut dbpf = Dbpf::new();
        let bytes = dbpf.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let loaded = Dbpf::from_bytes(&bytes).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.header().index_offset as usize, HEADER_SIZE);
    }

    #[test]
    fn test_canonical_layout() {
        let mut dbpf = Dbpf::new();
        dbpf.add_raw(Tgi::new(1, 2, 3), vec![0xAA; 10]);
        dbpf.add(Tgi::new(FileType::ComSerializer.id(), 0, 0), com())
            .unwrap();
        let bytes = dbpf.to_bytes().unwrap();

        let header = Header::from_bytes(&bytes).unwrap();
        assert_eq!(header.index_count, 2);
        assert_eq!(dbpf.entries()[0].offset() as usize, HEADER_SIZE);
        assert_eq!(dbpf.entries()[1].offset() as usize, HEADER_SIZE + 10);
        assert_eq!(header.index_offset as usize, bytes.len() - 40);
        assert_eq!(header.index_size, 40);
    }

    #[test]
    fn test_new_large_entry_is_compressed_and_listed() {
        let mut dbpf = Dbpf::new();
        let mut com = ComSerializerFile::new();
        for i in 0..64 {
            com.set(0x1000 + i, 1);
        }
        dbpf.add(Tgi::new(FileType::ComSerializer.id(), 0, 0), Record::ComSerializer(com))
            .unwrap();
        let bytes = dbpf.to_bytes().unwrap();

        assert_eq!(dbpf.len(), 2);
        assert_eq!(dbpf.entries()[1].tgi(), DIRECTORY_TGI);
        assert!(dbpf.entries()[0].is_compressed());

        let mut loaded = Dbpf::from_bytes(&bytes).unwrap();
        assert!(loaded.entries()[0].is_compressed());
        let com = loaded.subfile::<ComSerializerFile>().unwrap().unwrap();
        assert_eq!(com.len(), 64);
    }

    #[test]
    fn test_entry_out_of_bounds() {
        let mut dbpf = Dbpf::new();
        dbpf.add_raw(Tgi::new(1, 2, 3), vec![0xAA; 10]);
        let mut bytes = dbpf.to_bytes().unwrap();
        let index = bytes.len() - 20;
        bytes[index + 16..index + 20].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            Dbpf::from_bytes(&bytes),
            Err(DbpfError::EntryOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_remove_and_find() {
        let mut dbpf = Dbpf::new();
        dbpf.add_raw(Tgi::new(1, 0, 0), vec![1]);
        dbpf.add_raw(Tgi::new(2, 0, 0), vec![2]);
        dbpf.add_raw(Tgi::new(1, 0, 1), vec![3]);
        assert_eq!(dbpf.filter_by_type(1).count(), 2);
        assert_eq!(dbpf.find_by_type(1).map(|e| e.raw()), Some(&[1u8][..]));
        assert!(dbpf.remove(Tgi::new(1, 0, 0)).is_some());
        assert_eq!(dbpf.find_by_type(1).map(|e| e.raw()), Some(&[3u8][..]));
        assert!(dbpf.remove(Tgi::new(9, 9, 9)).is_none());
    }

    #[test]
    fn test_index_goes_stale_on_mutable_access() {
        let mut dbpf = Dbpf::new();
        dbpf.add(Tgi::new(FileType::ComSerializer.id(), 0, 0), com())
            .unwrap();
        dbpf.rebuild_index().unwrap();
        assert!(dbpf.index().is_some());
        dbpf.subfile::<ComSerializerFile>().unwrap();
        assert!(dbpf.index().is_some());
        dbpf.subfile_mut::<ComSerializerFile>().unwrap();
        assert!(dbpf.index().is_none());
    }

    /// Lay out `entries` the way another tool might have written them
    fn container(entries: &[(Tgi, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        let mut table = ByteWriter::new();
        for (tgi, bytes) in entries {
            IndexEntry {
                tgi: *tgi,
                offset: out.len() as u32,
                size: bytes.len() as u32,
            }
            .write(&mut table)
            .unwrap();
            out.extend_from_slice(bytes);
        }
        let mut header = Header::new();
        header.index_count = entries.len() as u32;
        header.index_offset = out.len() as u32;
        header.index_size = table.len() as u32;
        out.extend_from_slice(&table.into_inner());
        out[..HEADER_SIZE].copy_from_slice(&header.to_bytes().unwrap());
        out
    }

    fn directory(rows: &[(Tgi, u32)]) -> Vec<u8> {
        let mut w = ByteWriter::new();
        for (tgi, size) in rows {
            w.u32(tgi.type_id).unwrap();
            w.u32(tgi.group_id).unwrap();
            w.u32(tgi.instance_id).unwrap();
            w.u32(*size).unwrap();
        }
        w.into_inner()
    }

    #[test]
    fn test_unmodified_save_keeps_stale_directory_rows() {
        let packed = Tgi::new(1, 0, 0);
        let gone = Tgi::new(9, 9, 9);
        let original = container(&[
            (packed, compression::compress(&[7u8; 500])),
            (DIRECTORY_TGI, directory(&[(packed, 500), (gone, 100)])),
        ]);

        let mut dbpf = Dbpf::from_bytes(&original).unwrap();
        assert!(!dbpf.is_dirty());
        assert!(dbpf.entries()[0].is_compressed());
        assert_eq!(dbpf.to_bytes().unwrap(), original);

        // A structural edit rewrites the directory without the stale row
        dbpf.add_raw(Tgi::new(2, 0, 0), vec![1, 2, 3]);
        dbpf.to_bytes().unwrap();
        let dir = dbpf.find(DIRECTORY_TGI).unwrap();
        assert_eq!(dir.raw(), &directory(&[(packed, 500)])[..]);
    }

    #[test]
    fn test_removing_an_edited_entry_stales_the_index() {
        let key = Tgi::new(FileType::ComSerializer.id(), 0, 0);
        let mut dbpf = Dbpf::new();
        dbpf.add_raw(Tgi::new(1, 0, 0), vec![1]);
        dbpf.add(key, com()).unwrap();
        dbpf.find_mut(key).unwrap().read_mut().unwrap();
        dbpf.rebuild_index().unwrap();
        assert!(dbpf.index().is_some());

        dbpf.remove(key).unwrap();
        assert!(dbpf.index().is_none());

        dbpf.rebuild_index().unwrap();
        dbpf.add(key, com()).unwrap();
        assert!(dbpf.index().is_none());
    }
}
