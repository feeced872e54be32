use super::entity::RecordHeader;
use super::grid::{check_dimensions, SpatialGrid};
use super::lot::serde_bytes_hex;
use super::{record_variant, FileType, Record, Subfile, SubfileKind};
use crate::core::error::Result;
use crate::core::pointer::{Pointer, PointerSlot};
use crate::core::stream::ByteReader;
use serde::Serialize;

/// Water network simulator state
///
/// One connection-flag byte per tile, stored row by row, followed by the
/// list of pipe tiles the simulator walks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlumbingSimulatorFile {
    pub header: RecordHeader,
    pub cells: SpatialGrid<u8>,
    pub revision: u32,
    /// Pipe tiles, never null in a consistent save
    pub pipes: Vec<Pointer>,
    #[serde(with = "serde_bytes_hex")]
    pub tail: Vec<u8>,
}

impl PlumbingSimulatorFile {
    pub fn new(size: u32) -> Result<Self> {
        Ok(PlumbingSimulatorFile {
            header: RecordHeader::new(1),
            cells: SpatialGrid::new(size, size)?,
            revision: 0,
            pipes: Vec::new(),
            tail: Vec::new(),
        })
    }

    pub fn x_size(&self) -> u32 {
        self.cells.x_size()
    }

    /// Drop every pipe and connection flag
    pub fn clear(&mut self) {
        self.cells.fill(0);
        self.pipes.clear();
    }

    pub fn pointers(&self) -> Vec<PointerSlot> {
        self.pipes
            .iter()
            .map(|p| PointerSlot::required(Self::TYPE_ID, *p))
            .collect()
    }
}

impl Subfile for PlumbingSimulatorFile {
    const TYPE_ID: u32 = FileType::PlumbingSimulator as u32;
    const KIND: SubfileKind = SubfileKind::SpatialGrid;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let header = RecordHeader::read(&mut r, bytes)?;
        let x_size = r.u32()?;
        let z_size = r.u32()?;
        check_dimensions(x_size, z_size)?;
        let flags = r.bytes(x_size as usize * z_size as usize)?;
        let cells = SpatialGrid::from_cells(x_size, z_size, flags.to_vec())?;
        let revision = r.u32()?;

        let count = r.count(4)?;
        let mut pipes = Vec::with_capacity(count);
        for _ in 0..count {
            pipes.push(r.pointer()?.unwrap_or(Pointer::NULL));
        }

        Ok(PlumbingSimulatorFile {
            header,
            cells,
            revision,
            pipes,
            tail: r.rest().to_vec(),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = self.header.begin()?;
        w.u32(self.cells.x_size())?;
        w.u32(self.cells.z_size())?;
        w.bytes(self.cells.cells())?;
        w.u32(self.revision)?;
        w.u32(self.pipes.len() as u32)?;
        for pipe in &self.pipes {
            w.pointer(Some(pipe))?;
        }
        w.bytes(&self.tail)?;
        Ok(RecordHeader::finish(w))
    }

    record_variant!(PlumbingSimulatorFile, PlumbingSimulator);
}
