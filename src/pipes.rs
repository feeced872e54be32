//! Pipe network generation
//!
//! Builds pipe tiles from the connection flags the plumbing simulator keeps
//! per tile, and lays out a regular network of horizontal rows joined by one
//! vertical spine.

use crate::core::error::{DbpfError, Result};
use crate::core::pointer::Pointer;
use crate::core::subfile::{Color, FileType, Pipe, SpatialGrid, Vertex};
use crate::savegame::Savegame;
use crate::terrain::Elevation;
use tracing::info;

pub const WEST: u8 = 0b0001;
pub const NORTH: u8 = 0b0010;
pub const EAST: u8 = 0b0100;
pub const SOUTH: u8 = 0b1000;
/// Set on every tile that holds a pipe
pub const PRESENT: u8 = 0b1_0000;

/// Metric size of one city tile
pub const TILE_SIZE: f32 = 16.0;

/// Depth of the trench a pipe sits in
const TRENCH_DEPTH: f32 = 10.2;
const MODEL_DEPTH: f32 = 1.4;
const SIDE_V: f32 = 0.637_500_76;

const TEXTURE_END: u32 = 0x0000_0300;
const TEXTURE_STRAIGHT: u32 = 0x0000_4B00;
const TEXTURE_TEE: u32 = 0x0000_5700;
const TEXTURE_CROSS: u32 = 0x0002_0700;

/// Connection value written for every connected side
const CONNECTED: u8 = 0x02;

/// Closed sides as tile-relative line segments `(di, dj) -> (di', dj')`
const SIDES: [(u8, [(u32, u32); 2]); 4] = [
    (WEST, [(0, 1), (0, 0)]),
    (NORTH, [(0, 0), (1, 0)]),
    (EAST, [(1, 0), (1, 1)]),
    (SOUTH, [(1, 1), (0, 1)]),
];

fn trench_color() -> Color {
    Color::new(0xFF, 0xFF, 0xFF, 0x80)
}

/// Build the pipe tile at `(i, j)` with the given connection flags
pub fn pipe_tile(i: u32, j: u32, connections: u8, terrain: &dyn Elevation) -> Pipe {
    let x = TILE_SIZE * i as f32;
    let z = TILE_SIZE * j as f32;
    let mut pipe = Pipe::new();

    pipe.x = x + TILE_SIZE / 2.0;
    pipe.z = z + TILE_SIZE / 2.0;
    let surface = terrain.height(pipe.x, pipe.z);
    pipe.y = surface - MODEL_DEPTH;
    pipe.y_model = pipe.y;
    pipe.x_min = x;
    pipe.x_max = x + TILE_SIZE;
    pipe.y_min = surface - TRENCH_DEPTH;
    pipe.y_max = surface;
    pipe.z_min = z;
    pipe.z_max = z + TILE_SIZE;
    pipe.x_tile = i;
    pipe.z_tile = j;
    pipe.x_min_tract = 0x40 + (i / 4) as u8;
    pipe.x_max_tract = pipe.x_min_tract;
    pipe.z_min_tract = 0x40 + (j / 4) as u8;
    pipe.z_max_tract = pipe.z_min_tract;

    pipe.y_nw = terrain.height(x, z);
    pipe.y_ne = terrain.height(x + TILE_SIZE, z);
    pipe.y_sw = terrain.height(x, z + TILE_SIZE);
    pipe.y_se = terrain.height(x + TILE_SIZE, z + TILE_SIZE);

    // Bottom of the trench
    for a in 0..2u32 {
        for b in 0..2u32 {
            let across = (a != b) as u32;
            let vx = x + TILE_SIZE * a as f32;
            let vz = z + TILE_SIZE * across as f32;
            pipe.vertices[(2 * a + b) as usize] = Vertex {
                x: vx,
                y: terrain.height(vx, vz) - TRENCH_DEPTH,
                z: vz,
                u: a as f32,
                v: across as f32,
                ..Vertex::default()
            };
        }
    }
    pipe.bottom = pipe
        .vertices
        .iter()
        .map(|v| Vertex {
            color: trench_color(),
            ..*v
        })
        .collect();

    // Walls on every side without a connection
    for (side, line) in SIDES {
        if connections & side != 0 {
            continue;
        }
        for (a, (di, dj)) in line.iter().enumerate() {
            for b in 0..2 {
                let vx = TILE_SIZE * (i + di) as f32;
                let vz = TILE_SIZE * (j + dj) as f32;
                let lower = a != b;
                pipe.side_textures[0].push(Vertex {
                    x: vx,
                    y: terrain.height(vx, vz) - if lower { TRENCH_DEPTH } else { 0.0 },
                    z: vz,
                    u: a as f32,
                    v: if lower { SIDE_V } else { 0.0 },
                    color: trench_color(),
                });
            }
        }
        pipe.blocks += 1;
    }

    let west = connections & WEST != 0;
    let north = connections & NORTH != 0;
    let east = connections & EAST != 0;
    let south = connections & SOUTH != 0;
    let position = |sides: [bool; 4], value: bool| {
        sides.iter().position(|s| *s == value).unwrap_or(0) as u8
    };
    match [west, north, east, south].iter().filter(|c| **c).count() {
        1 => {
            pipe.texture_id = TEXTURE_END;
            pipe.orientation = position([south, west, north, east], true);
        }
        2 => {
            pipe.texture_id = TEXTURE_STRAIGHT;
            pipe.orientation = west as u8;
        }
        3 => {
            pipe.texture_id = TEXTURE_TEE;
            pipe.orientation = position([west, north, east, south], false);
        }
        4 => pipe.texture_id = TEXTURE_CROSS,
        _ => {}
    }

    pipe.matrix.set_position([pipe.x, pipe.y, pipe.z]);
    match pipe.orientation {
        1 => {
            pipe.matrix.set_ex([0.0, 0.0, 1.0]);
            pipe.matrix.set_ez([-1.0, 0.0, 0.0]);
        }
        2 => {
            pipe.matrix.set_ex([-1.0, 0.0, 0.0]);
            pipe.matrix.set_ez([0.0, 0.0, -1.0]);
        }
        3 => {
            pipe.matrix.set_ex([0.0, 0.0, -1.0]);
            pipe.matrix.set_ez([1.0, 0.0, 0.0]);
        }
        _ => {}
    }

    let flag = |on: bool| if on { CONNECTED } else { 0 };
    pipe.west_connection = flag(west);
    pipe.north_connection = flag(north);
    pipe.east_connection = flag(east);
    pipe.south_connection = flag(south);
    pipe
}

/// Connection flags of a grid network for a square city of `size` tiles
///
/// Horizontal rows every 13 tiles starting at row 6, plus a last row near the
/// edge when the gap exceeds 6 tiles, all joined by a vertical spine at
/// column `size / 2 - 1`.
pub fn grid_layout(size: u32) -> Result<SpatialGrid<u8>> {
    let mut grid = SpatialGrid::new(size, size)?;
    if size < 16 {
        return Ok(grid);
    }

    let mut rows: Vec<u32> = (6..size).step_by(13).collect();
    if let Some(&last) = rows.last() {
        if size - last > 6 {
            rows.push(size - 2);
        }
    }
    let spine = size / 2 - 1;

    let (a, b) = (3, size - 4);
    for &j in &rows {
        for i in a..=b {
            if i == spine {
                continue;
            }
            let flags = match i {
                _ if i == a => PRESENT | EAST,
                _ if i == b => PRESENT | WEST,
                _ => PRESENT | EAST | WEST,
            };
            grid.set(i, j, flags);
        }
    }

    let (first, last) = match (rows.first(), rows.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Ok(grid),
    };
    for j in first..=last {
        let mut flags = PRESENT;
        if j != first {
            flags |= NORTH;
        }
        if j != last {
            flags |= SOUTH;
        }
        if rows.contains(&j) {
            flags |= EAST | WEST;
        }
        grid.set(spine, j, flags);
    }
    Ok(grid)
}

/// Replace the pipe network of a city with one pipe per flagged tile
///
/// Returns the number of pipes laid.
pub fn lay_pipes(
    city: &mut Savegame,
    flags: &SpatialGrid<u8>,
    terrain: &dyn Elevation,
) -> Result<usize> {
    // Every record taking part must exist before any of them is touched
    city.pipes()?;
    city.com_serializer()?;
    let sim = city.plumbing_simulator()?;
    if sim.cells.x_size() != flags.x_size() || sim.cells.z_size() != flags.z_size() {
        return Err(DbpfError::malformed(format!(
            "{}x{} pipe layout does not fit a {}x{} city",
            flags.x_size(),
            flags.z_size(),
            sim.cells.x_size(),
            sim.cells.z_size()
        )));
    }

    let sim = city.plumbing_simulator_mut()?;
    sim.clear();
    for (x, z, flag) in flags.iter() {
        sim.cells.set(x, z, *flag);
    }

    let pipes = city.pipes_mut()?;
    pipes.clear();
    for (x, z, flag) in flags.iter() {
        if *flag != 0 {
            pipes.push(pipe_tile(x, z, *flag, terrain));
        }
    }

    // Fresh pipes get their addresses here
    city.rebuild_index()?;
    let pointers: Vec<Pointer> = city
        .pipes()?
        .iter()
        .map(|pipe| Pointer::new(FileType::Pipe.id(), pipe.header.mem))
        .collect();
    let count = pointers.len();

    let sim = city.plumbing_simulator_mut()?;
    sim.pipes = pointers;
    sim.revision = sim.revision.wrapping_add(1);
    city.com_serializer_mut()?
        .set(FileType::Pipe.id(), count as u32);

    info!("Laid {} pipes", count);
    Ok(count)
}
