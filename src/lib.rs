//! # sc4-dbpf - SimCity 4 savegame editing
//!
//! `sc4-dbpf` reads, edits and writes the DBPF packed files SimCity 4 stores
//! its cities and plugins in:
//!
//! - **Container codec** with per-entry QFS compression tracked through `DIR`
//! - **Typed records** for lots, pipes, zoning and simulator grids, exemplars
//! - **Pointer graph** kept consistent by a rebuildable item index
//! - **Atomic saves** that never leave a half-written city behind
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sc4_dbpf::{Result, Savegame};
//!
//! # fn main() -> Result<()> {
//! let mut city = Savegame::open("City - Twin Peaks.sc4")?;
//!
//! for lot in city.lots_mut()?.iter_mut() {
//!     lot.set_historical(true);
//! }
//!
//! city.save("City - Twin Peaks.sc4")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Raw entries
//!
//! ```rust,no_run
//! use sc4_dbpf::{Dbpf, Result};
//!
//! # fn main() -> Result<()> {
//! let mut dbpf = Dbpf::open("plugin.dat")?;
//! for entry in dbpf.entries() {
//!     println!("{} {} bytes", entry.tgi(), entry.size());
//! }
//! let bytes = dbpf.to_bytes()?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod pipes;
pub mod savegame;
pub mod terrain;

pub use crate::core::{
    compression::{CompressionConfig, CompressionMethod},
    config::Config,
    dbpf::{Dbpf, SaveImage},
    entry::{Entry, EntryState},
    error::{DbpfError, ErrorKind, Result},
    header::{Header, Tgi},
    index::{ItemIndex, ItemRef},
    pointer::Pointer,
    subfile::{
        ComSerializerFile, Exemplar, FileType, Lot, LotFile, Pipe, PipeFile,
        PlumbingSimulatorFile, Property, PropertyValue, Record, SpatialGrid, ZoneDeveloperFile,
    },
};
pub use crate::savegame::Savegame;
pub use crate::terrain::{Elevation, FlatTerrain};
