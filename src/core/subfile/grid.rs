use crate::core::error::{DbpfError, Result};
use serde::{Deserialize, Serialize};

/// Largest side length accepted when decoding a grid
pub const MAX_GRID_SIZE: u32 = 4096;

/// Fixed-size map of cells, one per city tile
///
/// Cells are stored row-major: the cell at `(x, z)` lives at
/// `z * x_size + x`. Dimensions never change after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialGrid<T> {
    x_size: u32,
    z_size: u32,
    cells: Vec<T>,
}

impl<T: Clone + Default> SpatialGrid<T> {
    pub fn new(x_size: u32, z_size: u32) -> Result<Self> {
        check_dimensions(x_size, z_size)?;
        Ok(SpatialGrid {
            x_size,
            z_size,
            cells: vec![T::default(); x_size as usize * z_size as usize],
        })
    }

    pub fn fill(&mut self, value: T) {
        self.cells.iter_mut().for_each(|cell| *cell = value.clone());
    }
}

impl<T> SpatialGrid<T> {
    /// Build from row-major cells
    pub fn from_cells(x_size: u32, z_size: u32, cells: Vec<T>) -> Result<Self> {
        check_dimensions(x_size, z_size)?;
        if cells.len() != x_size as usize * z_size as usize {
            return Err(DbpfError::malformed(format!(
                "{} cells do not fill a {}x{} grid",
                cells.len(),
                x_size,
                z_size
            )));
        }
        Ok(SpatialGrid {
            x_size,
            z_size,
            cells,
        })
    }

    pub fn x_size(&self) -> u32 {
        self.x_size
    }

    pub fn z_size(&self) -> u32 {
        self.z_size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn offset(&self, x: u32, z: u32) -> Option<usize> {
        (x < self.x_size && z < self.z_size).then(|| (z * self.x_size + x) as usize)
    }

    pub fn get(&self, x: u32, z: u32) -> Option<&T> {
        self.offset(x, z).map(|i| &self.cells[i])
    }

    pub fn get_mut(&mut self, x: u32, z: u32) -> Option<&mut T> {
        self.offset(x, z).map(move |i| &mut self.cells[i])
    }

    /// Overwrite one cell, returning false when `(x, z)` is off the grid
    pub fn set(&mut self, x: u32, z: u32, value: T) -> bool {
        match self.get_mut(x, z) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Cells in storage order with their coordinates
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &T)> + '_ {
        let x_size = self.x_size;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (i as u32 % x_size, i as u32 / x_size, cell))
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }
}

pub(crate) fn check_dimensions(x_size: u32, z_size: u32) -> Result<()> {
    if x_size == 0 || z_size == 0 || x_size > MAX_GRID_SIZE || z_size > MAX_GRID_SIZE {
        return Err(DbpfError::malformed(format!(
            "grid dimensions {}x{} out of range",
            x_size, z_size
        )));
    }
    Ok(())
}
