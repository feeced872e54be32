//! Shared fixtures: small cities assembled in memory

#![allow(dead_code)]

use sc4_dbpf::core::subfile::RecordHeader;
use sc4_dbpf::{
    ComSerializerFile, CompressionConfig, Config, Dbpf, FileType, Lot, LotFile, PipeFile, PlumbingSimulatorFile, Pointer,
    Record, Savegame, Tgi, ZoneDeveloperFile,
};

pub const LOT_MEMS: [u32; 3] = [0x0100_0001, 0x0100_0002, 0x0100_0003];

pub fn tgi(file_type: FileType) -> Tgi {
    Tgi::new(file_type.id(), 0, 0)
}

pub fn lot(mem: u32, x: u8, z: u8) -> Lot {
    let mut header = RecordHeader::new(8);
    header.mem = mem;
    Lot {
        header,
        iid: 0x6000_0000 | mem,
        min_x: x,
        min_z: z,
        max_x: x,
        max_z: z,
        y: 270.0,
        width: 1,
        depth: 1,
        zone_type: 1,
        zone_wealth: 2,
        building_iid: 0x3000_0000 | mem,
        tail: vec![0x11; 19],
        ..Default::default()
    }
}

/// A `size` x `size` city with three lots, each occupying one tile on the
/// diagonal, an empty pipe network and counters for both
pub fn city_dbpf(size: u32) -> Dbpf {
    city_dbpf_with(size, Config::default())
}

pub fn city_dbpf_with(size: u32, config: Config) -> Dbpf {
    let mut dbpf = Dbpf::with_config(config);

    let lots: LotFile = LOT_MEMS
        .iter()
        .enumerate()
        .map(|(i, mem)| lot(*mem, i as u8, i as u8))
        .collect::<Vec<_>>()
        .into();

    let mut zoning = ZoneDeveloperFile::new(size).unwrap();
    for (i, mem) in LOT_MEMS.iter().enumerate() {
        let i = i as u32;
        zoning
            .cells
            .set(i, i, Some(Pointer::new(FileType::Lot.id(), *mem)));
    }

    let mut com = ComSerializerFile::new();
    com.set(FileType::Lot.id(), LOT_MEMS.len() as u32);
    com.set(FileType::Pipe.id(), 0);

    dbpf.add(tgi(FileType::Lot), Record::Lots(lots)).unwrap();
    dbpf.add(tgi(FileType::Pipe), Record::Pipes(PipeFile::new()))
        .unwrap();
    dbpf.add(tgi(FileType::ZoneDeveloper), Record::ZoneDeveloper(zoning))
        .unwrap();
    dbpf.add(
        tgi(FileType::PlumbingSimulator),
        Record::PlumbingSimulator(PlumbingSimulatorFile::new(size).unwrap()),
    )
    .unwrap();
    dbpf.add(tgi(FileType::ComSerializer), Record::ComSerializer(com))
        .unwrap();
    dbpf
}

/// The fixture city after one save and reload
pub fn city_bytes(size: u32) -> Vec<u8> {
    city_dbpf(size).to_bytes().unwrap()
}

pub fn city(size: u32) -> Savegame {
    Savegame::from_bytes(&city_bytes(size)).unwrap()
}

/// Config that stores every new entry uncompressed
pub fn uncompressed() -> Config {
    Config {
        compression: CompressionConfig::none(),
        ..Default::default()
    }
}

/// The fixture city with every record stored as plain bytes
pub fn uncompressed_city_bytes(size: u32) -> Vec<u8> {
    city_dbpf_with(size, uncompressed()).to_bytes().unwrap()
}
