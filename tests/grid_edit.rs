//! Grid edits on cities of every size the game produces

mod common;

use common::{city, tgi, LOT_MEMS};
use sc4_dbpf::pipes::{grid_layout, lay_pipes, PRESENT};
use sc4_dbpf::{DbpfError, FileType, FlatTerrain, Pointer, Savegame};

const SIZES: [u32; 3] = [64, 128, 256];

#[test]
fn test_zoning_edit_round_trip() {
    for size in SIZES {
        let mut city = city(size);
        let far = Pointer::new(FileType::Lot.id(), LOT_MEMS[2]);
        {
            let zoning = city.zone_developer_mut().unwrap();
            assert!(zoning.cells.set(size - 1, 0, Some(far)));
            assert!(!zoning.cells.set(size, 0, Some(far)));
        }
        let bytes = city.to_bytes().unwrap();

        let mut reloaded = Savegame::from_bytes(&bytes).unwrap();
        let zoning = reloaded.zone_developer().unwrap();
        assert_eq!(zoning.cells.x_size(), size);
        assert_eq!(zoning.cells.z_size(), size);
        assert_eq!(zoning.lot_at(size - 1, 0), Some(far));
        assert_eq!(zoning.lot_at(0, size - 1), None);
        assert_eq!(zoning.cells.iter().filter(|(_, _, c)| c.is_some()).count(), 4);
    }
}

#[test]
fn test_pipe_layout_round_trip() {
    for size in SIZES {
        let mut city = city(size);
        let layout = grid_layout(size).unwrap();
        let count = lay_pipes(&mut city, &layout, &FlatTerrain::default()).unwrap();
        let present = layout.cells().iter().filter(|c| **c & PRESENT != 0).count();
        assert_eq!(count, present);
        assert!(count > 0);

        let bytes = city.to_bytes().unwrap();
        let mut reloaded = Savegame::from_bytes(&bytes).unwrap();

        let sim = reloaded.plumbing_simulator().unwrap();
        assert_eq!(sim.cells, layout);
        assert_eq!(sim.pipes.len(), count);
        assert_eq!(sim.revision, 1);
        let pipes = sim.pipes.clone();

        let com = reloaded.com_serializer().unwrap();
        assert_eq!(com.get(FileType::Pipe.id()), Some(count as u32));

        assert_eq!(reloaded.pipes().unwrap().len(), count);
        for pointer in pipes {
            let pipe = reloaded
                .resolve_entity::<sc4_dbpf::Pipe>(&pointer)
                .unwrap()
                .unwrap();
            let flags = layout.get(pipe.x_tile, pipe.z_tile).copied().unwrap();
            assert_ne!(flags & PRESENT, 0);
        }
    }
}

#[test]
fn test_relaying_pipes_replaces_the_network() {
    let mut city = city(64);
    let layout = grid_layout(64).unwrap();
    let terrain = FlatTerrain::default();

    let first = lay_pipes(&mut city, &layout, &terrain).unwrap();
    let bytes = city.to_bytes().unwrap();

    let mut city = Savegame::from_bytes(&bytes).unwrap();
    let second = lay_pipes(&mut city, &layout, &terrain).unwrap();
    assert_eq!(first, second);
    assert_eq!(city.pipes().unwrap().len(), second);
    assert_eq!(city.plumbing_simulator().unwrap().revision, 2);
    assert!(city.to_bytes().is_ok());
}

#[test]
fn test_layout_must_match_city_size() {
    let mut city = city(128);
    let layout = grid_layout(64).unwrap();
    assert!(lay_pipes(&mut city, &layout, &FlatTerrain::default()).is_err());
}

#[test]
fn test_plumbing_edit_rewrites_only_its_entry() {
    let mut city = city(128);
    let before: Vec<(sc4_dbpf::Tgi, u32, u32, Vec<u8>)> = city
        .dbpf()
        .entries()
        .iter()
        .map(|e| (e.tgi(), e.offset(), e.size(), e.raw().to_vec()))
        .collect();
    let old_crc = city.plumbing_simulator().unwrap().header.crc;

    {
        let sim = city.plumbing_simulator_mut().unwrap();
        for i in 0..10 {
            assert!(sim.cells.set(i * 3, i * 7, PRESENT));
        }
    }
    let bytes = city.to_bytes().unwrap();
    let mut reloaded = Savegame::from_bytes(&bytes).unwrap();

    let sim = reloaded.plumbing_simulator().unwrap();
    assert_ne!(sim.header.crc, old_crc);
    assert!(sim.header.checksum_ok());
    assert_eq!(sim.cells.cells().iter().filter(|c| **c == PRESENT).count(), 10);
    assert_eq!(sim.cells.get(27, 63), Some(&PRESENT));

    let plumbing = tgi(FileType::PlumbingSimulator);
    let entries = reloaded.dbpf().entries();
    assert_eq!(entries.len(), before.len());

    // Index rows describe the canonical layout of the new payloads
    let mut offset = entries[0].offset();
    for entry in entries {
        assert_eq!(entry.offset(), offset);
        assert_eq!(entry.size() as usize, entry.raw().len());
        offset += entry.size();
    }

    for ((key, old_offset, old_size, raw), entry) in before.iter().zip(entries) {
        assert_eq!(entry.tgi(), *key);
        if *key == plumbing {
            assert_ne!(entry.raw(), &raw[..]);
            assert_eq!(entry.offset(), *old_offset);
        } else {
            assert_eq!(entry.raw(), &raw[..], "entry {} changed", key);
            assert_eq!(entry.size(), *old_size);
        }
    }
}

#[test]
fn test_missing_pipe_file_leaves_simulator_untouched() {
    let mut city = city(64);
    city.dbpf_mut().remove(tgi(FileType::Pipe)).unwrap();
    let layout = grid_layout(64).unwrap();

    let err = lay_pipes(&mut city, &layout, &FlatTerrain::default()).unwrap_err();
    assert!(matches!(err, DbpfError::MissingSubfile(id) if id == FileType::Pipe.id()));

    let sim_key = tgi(FileType::PlumbingSimulator);
    assert!(!city.dbpf().find(sim_key).unwrap().is_dirty());
    let sim = city.plumbing_simulator().unwrap();
    assert_eq!(sim.revision, 0);
    assert!(sim.cells.cells().iter().all(|c| *c == 0));
    assert!(!city.dbpf().find(tgi(FileType::ComSerializer)).unwrap().is_dirty());
}
