//! Subfile registry and record codecs
//!
//! Every decodable entry type is registered here with its variant kind and a
//! decode function. Encoding goes through [`Record::encode`]. Types without a
//! registration are carried through saves byte for byte but cannot be read.
//!
//! | type id      | record                   | kind         |
//! |--------------|--------------------------|--------------|
//! | `0x09BD5D4A` | [`LotFile`]              | EntityList   |
//! | `0x49C05B9F` | [`PipeFile`]             | EntityList   |
//! | `0x41800000` | [`ZoneDeveloperFile`]    | SpatialGrid  |
//! | `0x088E1962` | [`PlumbingSimulatorFile`]| SpatialGrid  |
//! | `0x499B23FE` | [`ComSerializerFile`]    | ScalarState  |
//! | `0x6534284A` | [`Exemplar`]             | PropertyList |
//! | `0x05342861` | [`Exemplar`] (cohort)    | PropertyList |

pub mod com_serializer;
pub mod entity;
pub mod exemplar;
pub mod geometry;
pub mod grid;
pub mod lot;
pub mod pipe;
pub mod plumbing;
pub mod zone_developer;

pub use com_serializer::ComSerializerFile;
pub use entity::{Entity, EntityList, RecordHeader, RECORD_HEADER_SIZE};
pub use exemplar::{Exemplar, ExemplarKind, Property, PropertyValue};
pub use geometry::{Color, Transform, Vertex};
pub use grid::SpatialGrid;
pub use lot::{Lot, LotFile};
pub use pipe::{Pipe, PipeFile};
pub use plumbing::PlumbingSimulatorFile;
pub use zone_developer::ZoneDeveloperFile;

use crate::core::error::{DbpfError, Result};
use crate::core::header::Tgi;
use crate::core::pointer::PointerSlot;
use serde::Serialize;

/// Known entry types of a savegame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FileType {
    Lot = 0x09BD_5D4A,
    Pipe = 0x49C0_5B9F,
    ZoneDeveloper = 0x4180_0000,
    PlumbingSimulator = 0x088E_1962,
    ComSerializer = 0x499B_23FE,
    Exemplar = 0x6534_284A,
    Cohort = 0x0534_2861,
    Directory = 0xE86B_1EEF,
}

impl FileType {
    pub fn from_u32(value: u32) -> Option<Self> {
        use FileType::*;
        [
            Lot,
            Pipe,
            ZoneDeveloper,
            PlumbingSimulator,
            ComSerializer,
            Exemplar,
            Cohort,
            Directory,
        ]
        .into_iter()
        .find(|t| *t as u32 == value)
    }

    pub fn id(self) -> u32 {
        self as u32
    }
}

/// Key of the directory-of-compressed-files entry
pub const DIRECTORY_TGI: Tgi = Tgi::new(0xE86B_1EEF, 0xE86B_1EEF, 0x286B_1F03);

/// Variant family of a record codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubfileKind {
    /// Concatenated addressed entities with geometry
    EntityList,
    /// Fixed-size grid of cells
    SpatialGrid,
    /// Flat counters
    ScalarState,
    /// Exemplar style property list
    PropertyList,
}

impl SubfileKind {
    /// Whether records of this kind own mem addresses or hold pointers
    pub fn is_addressable(self) -> bool {
        matches!(self, SubfileKind::EntityList | SubfileKind::SpatialGrid)
    }
}

/// Decoded content of one entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Record {
    Lots(LotFile),
    Pipes(PipeFile),
    ZoneDeveloper(ZoneDeveloperFile),
    PlumbingSimulator(PlumbingSimulatorFile),
    ComSerializer(ComSerializerFile),
    Exemplar(Exemplar),
}

/// A record whose stored checksum did not match its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumFailure {
    pub mem: u32,
    pub stored: u32,
    pub computed: u32,
}

impl Record {
    pub fn kind(&self) -> SubfileKind {
        match self {
            Record::Lots(_) | Record::Pipes(_) => SubfileKind::EntityList,
            Record::ZoneDeveloper(_) | Record::PlumbingSimulator(_) => SubfileKind::SpatialGrid,
            Record::ComSerializer(_) => SubfileKind::ScalarState,
            Record::Exemplar(_) => SubfileKind::PropertyList,
        }
    }

    /// JSON view of the decoded content
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Record::Lots(r) => r.encode(),
            Record::Pipes(r) => r.encode(),
            Record::ZoneDeveloper(r) => r.encode(),
            Record::PlumbingSimulator(r) => r.encode(),
            Record::ComSerializer(r) => r.encode(),
            Record::Exemplar(r) => r.encode(),
        }
    }

    /// Mutable mem address slots, keyed by item position (`None` for the record itself)
    pub fn addresses_mut(&mut self) -> Vec<(Option<usize>, &mut u32)> {
        match self {
            Record::Lots(r) => r.addresses_mut(),
            Record::Pipes(r) => r.addresses_mut(),
            Record::ZoneDeveloper(r) => vec![(None, &mut r.header.mem)],
            Record::PlumbingSimulator(r) => vec![(None, &mut r.header.mem)],
            Record::ComSerializer(_) | Record::Exemplar(_) => Vec::new(),
        }
    }

    /// Every pointer slot held by the record
    pub fn pointers(&self) -> Vec<PointerSlot> {
        match self {
            Record::ZoneDeveloper(r) => r.pointers(),
            Record::PlumbingSimulator(r) => r.pointers(),
            _ => Vec::new(),
        }
    }

    /// Records whose stored checksum was stale when decoded
    pub fn checksum_failures(&self) -> Vec<ChecksumFailure> {
        match self {
            Record::Lots(r) => r.checksum_failures(),
            Record::Pipes(r) => r.checksum_failures(),
            Record::ZoneDeveloper(r) => r.header.failure().into_iter().collect(),
            Record::PlumbingSimulator(r) => r.header.failure().into_iter().collect(),
            Record::ComSerializer(_) | Record::Exemplar(_) => Vec::new(),
        }
    }
}

/// Typed view of one registered record type
pub trait Subfile: Sized {
    const TYPE_ID: u32;
    const KIND: SubfileKind;

    fn decode(bytes: &[u8]) -> Result<Self>;
    fn encode(&self) -> Result<Vec<u8>>;

    fn from_record(record: &Record) -> Option<&Self>;
    fn from_record_mut(record: &mut Record) -> Option<&mut Self>;
    fn into_record(self) -> Record;
}

/// Registry row: type id to codec
pub struct Registration {
    pub type_id: u32,
    pub name: &'static str,
    pub kind: SubfileKind,
    decode: fn(&[u8]) -> Result<Record>,
}

fn decode_as<T: Subfile>(bytes: &[u8]) -> Result<Record> {
    T::decode(bytes).map(T::into_record)
}

static REGISTRY: &[Registration] = &[
    Registration {
        type_id: FileType::Lot as u32,
        name: "LotFile",
        kind: SubfileKind::EntityList,
        decode: decode_as::<LotFile>,
    },
    Registration {
        type_id: FileType::Pipe as u32,
        name: "PipeFile",
        kind: SubfileKind::EntityList,
        decode: decode_as::<PipeFile>,
    },
    Registration {
        type_id: FileType::ZoneDeveloper as u32,
        name: "ZoneDeveloperFile",
        kind: SubfileKind::SpatialGrid,
        decode: decode_as::<ZoneDeveloperFile>,
    },
    Registration {
        type_id: FileType::PlumbingSimulator as u32,
        name: "PlumbingSimulatorFile",
        kind: SubfileKind::SpatialGrid,
        decode: decode_as::<PlumbingSimulatorFile>,
    },
    Registration {
        type_id: FileType::ComSerializer as u32,
        name: "ComSerializerFile",
        kind: SubfileKind::ScalarState,
        decode: decode_as::<ComSerializerFile>,
    },
    Registration {
        type_id: FileType::Exemplar as u32,
        name: "Exemplar",
        kind: SubfileKind::PropertyList,
        decode: decode_as::<Exemplar>,
    },
    Registration {
        type_id: FileType::Cohort as u32,
        name: "Cohort",
        kind: SubfileKind::PropertyList,
        decode: decode_as::<Exemplar>,
    },
];

/// Look up the codec registered for a type id
pub fn lookup(type_id: u32) -> Option<&'static Registration> {
    REGISTRY.iter().find(|r| r.type_id == type_id)
}

/// Decode an entry payload through the registry
pub fn decode(type_id: u32, bytes: &[u8]) -> Result<Record> {
    let registration = lookup(type_id).ok_or(DbpfError::UnsupportedType(type_id))?;
    (registration.decode)(bytes)
}

/// Whether pointers of this type can be checked against the item index
pub fn is_addressable(type_id: u32) -> bool {
    lookup(type_id).map_or(false, |r| r.kind.is_addressable())
}

macro_rules! record_variant {
    ($ty:ty, $variant:ident) => {
        fn from_record(record: &Record) -> Option<&Self> {
            match record {
                Record::$variant(r) => Some(r),
                _ => None,
            }
        }

        fn from_record_mut(record: &mut Record) -> Option<&mut Self> {
            match record {
                Record::$variant(r) => Some(r),
                _ => None,
            }
        }

        fn into_record(self) -> Record {
            Record::$variant(self)
        }
    };
}

pub(crate) use record_variant;
