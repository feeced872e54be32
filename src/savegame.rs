use crate::core::config::Config;
use crate::core::dbpf::Dbpf;
use crate::core::error::{DbpfError, Result};
use crate::core::index::{ItemIndex, ItemRef};
use crate::core::pointer::Pointer;
use crate::core::subfile::{
    ComSerializerFile, Entity, EntityList, Exemplar, FileType, LotFile, PipeFile,
    PlumbingSimulatorFile, Subfile, ZoneDeveloperFile,
};
use std::path::Path;

/// A city save with typed access to its well-known subfiles
///
/// Thin wrapper around [`Dbpf`]: every accessor decodes on first use and the
/// `_mut` variants mark the subfile for re-encoding on the next save.
pub struct Savegame {
    dbpf: Dbpf,
}

impl From<Dbpf> for Savegame {
    fn from(dbpf: Dbpf) -> Self {
        Savegame { dbpf }
    }
}

impl Savegame {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Dbpf::open(path).map(Savegame::from)
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        Dbpf::open_with(path, config).map(Savegame::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Dbpf::from_bytes(bytes).map(Savegame::from)
    }

    pub fn from_bytes_with(bytes: &[u8], config: Config) -> Result<Self> {
        Dbpf::from_bytes_with(bytes, config).map(Savegame::from)
    }

    pub fn dbpf(&self) -> &Dbpf {
        &self.dbpf
    }

    pub fn dbpf_mut(&mut self) -> &mut Dbpf {
        &mut self.dbpf
    }

    pub fn into_inner(self) -> Dbpf {
        self.dbpf
    }

    /// First subfile of type `T`, failing when the save has none
    pub fn subfile<T: Subfile>(&mut self) -> Result<&T> {
        self.dbpf
            .subfile::<T>()?
            .ok_or(DbpfError::MissingSubfile(T::TYPE_ID))
    }

    pub fn subfile_mut<T: Subfile>(&mut self) -> Result<&mut T> {
        self.dbpf
            .subfile_mut::<T>()?
            .ok_or(DbpfError::MissingSubfile(T::TYPE_ID))
    }

    pub fn lots(&mut self) -> Result<&LotFile> {
        self.subfile()
    }

    pub fn lots_mut(&mut self) -> Result<&mut LotFile> {
        self.subfile_mut()
    }

    pub fn pipes(&mut self) -> Result<&PipeFile> {
        self.subfile()
    }

    pub fn pipes_mut(&mut self) -> Result<&mut PipeFile> {
        self.subfile_mut()
    }

    pub fn zone_developer(&mut self) -> Result<&ZoneDeveloperFile> {
        self.subfile()
    }

    pub fn zone_developer_mut(&mut self) -> Result<&mut ZoneDeveloperFile> {
        self.subfile_mut()
    }

    pub fn plumbing_simulator(&mut self) -> Result<&PlumbingSimulatorFile> {
        self.subfile()
    }

    pub fn plumbing_simulator_mut(&mut self) -> Result<&mut PlumbingSimulatorFile> {
        self.subfile_mut()
    }

    pub fn com_serializer(&mut self) -> Result<&ComSerializerFile> {
        self.subfile()
    }

    pub fn com_serializer_mut(&mut self) -> Result<&mut ComSerializerFile> {
        self.subfile_mut()
    }

    /// Every exemplar and cohort in the save
    pub fn exemplars_mut(&mut self) -> Result<Vec<&mut Exemplar>> {
        self.dbpf
            .entries_mut()
            .iter_mut()
            .filter(|e| {
                matches!(
                    FileType::from_u32(e.type_id()),
                    Some(FileType::Exemplar | FileType::Cohort)
                )
            })
            .map(|e| e.read_as_mut::<Exemplar>())
            .collect()
    }

    pub fn rebuild_index(&mut self) -> Result<&ItemIndex> {
        self.dbpf.rebuild_index()
    }

    pub fn resolve(&mut self, pointer: &Pointer) -> Result<Option<ItemRef>> {
        self.dbpf.resolve(pointer)
    }

    /// Entity a pointer names, e.g. the lot of a zone developer cell
    pub fn resolve_entity<T: Entity>(&mut self, pointer: &Pointer) -> Result<Option<&T>> {
        let item = match self.dbpf.resolve(pointer)? {
            Some(ItemRef {
                entry,
                item: Some(item),
                ..
            }) => (entry, item),
            _ => return Ok(None),
        };
        let list = self.dbpf.entries_mut()[item.0].read_as::<EntityList<T>>()?;
        Ok(list.get(item.1))
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.dbpf.to_bytes()
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.dbpf.save(path)
    }

    #[cfg(feature = "async")]
    pub async fn save_async<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.dbpf.save_async(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::header::Tgi;
    use crate::core::subfile::{Lot, Record};

    fn city() -> Savegame {
        let mut dbpf = Dbpf::new();
        let lots: LotFile = vec![Lot {
            iid: 0x42,
            ..Default::default()
        }]
        .into();
        dbpf.add(Tgi::new(FileType::Lot.id(), 0, 0), Record::Lots(lots))
            .unwrap();
        Savegame::from(dbpf)
    }

    #[test]
    fn test_missing_subfile() {
        let mut city = city();
        let err = city.pipes().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert!(matches!(err, DbpfError::MissingSubfile(id) if id == FileType::Pipe.id()));
    }

    #[test]
    fn test_resolve_entity_after_rebuild() {
        let mut city = city();
        city.rebuild_index().unwrap();
        let mem = city.lots().unwrap()[0].header.mem;
        assert_ne!(mem, 0);

        let pointer = Pointer::new(FileType::Lot.id(), mem);
        let lot = city.resolve_entity::<Lot>(&pointer).unwrap().unwrap();
        assert_eq!(lot.iid, 0x42);
        assert!(city
            .resolve_entity::<Lot>(&Pointer::new(FileType::Lot.id(), mem + 1))
            .unwrap()
            .is_none());
    }
}
