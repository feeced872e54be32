use super::entity::RecordHeader;
use super::grid::{check_dimensions, SpatialGrid};
use super::lot::serde_bytes_hex;
use super::{record_variant, FileType, Record, Subfile, SubfileKind};
use crate::core::error::{DbpfError, Result};
use crate::core::pointer::{Pointer, PointerSlot};
use crate::core::stream::ByteReader;
use serde::Serialize;

/// Map from tile to the lot occupying it
///
/// Cells are serialized column by column (x outer, z inner), each as a
/// nullable pointer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneDeveloperFile {
    pub header: RecordHeader,
    pub cells: SpatialGrid<Option<Pointer>>,
    #[serde(with = "serde_bytes_hex")]
    pub tail: Vec<u8>,
}

impl ZoneDeveloperFile {
    pub fn new(size: u32) -> Result<Self> {
        Ok(ZoneDeveloperFile {
            header: RecordHeader::new(1),
            cells: SpatialGrid::new(size, size)?,
            tail: Vec::new(),
        })
    }

    /// Lot pointer of the tile at `(x, z)`
    pub fn lot_at(&self, x: u32, z: u32) -> Option<Pointer> {
        self.cells.get(x, z).copied().flatten()
    }

    pub fn pointers(&self) -> Vec<PointerSlot> {
        self.cells
            .cells()
            .iter()
            .map(|cell| PointerSlot::nullable(Self::TYPE_ID, *cell))
            .collect()
    }
}

impl Subfile for ZoneDeveloperFile {
    const TYPE_ID: u32 = FileType::ZoneDeveloper as u32;
    const KIND: SubfileKind = SubfileKind::SpatialGrid;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let header = RecordHeader::read(&mut r, bytes)?;
        let x_size = r.u32()?;
        let z_size = r.u32()?;
        check_dimensions(x_size, z_size)?;
        // Each cell takes at least its address word
        let needed = x_size as usize * z_size as usize * 4;
        if needed > r.remaining() {
            return Err(DbpfError::malformed(format!(
                "{}x{} zoning grid needs at least {} bytes, {} left",
                x_size,
                z_size,
                needed,
                r.remaining()
            )));
        }

        let mut cells = SpatialGrid::new(x_size, z_size)?;
        for x in 0..x_size {
            for z in 0..z_size {
                cells.set(x, z, r.pointer()?);
            }
        }

        Ok(ZoneDeveloperFile {
            header,
            cells,
            tail: r.rest().to_vec(),
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = self.header.begin()?;
        w.u32(self.cells.x_size())?;
        w.u32(self.cells.z_size())?;
        for x in 0..self.cells.x_size() {
            for z in 0..self.cells.z_size() {
                w.pointer(self.cells.get(x, z).and_then(Option::as_ref))?;
            }
        }
        w.bytes(&self.tail)?;
        Ok(RecordHeader::finish(w))
    }

    record_variant!(ZoneDeveloperFile, ZoneDeveloper);
}
