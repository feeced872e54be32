//! DBPF container and savegame record codecs
//!
//! ## Layers
//!
//! - [`error`] - Error types and classification
//! - [`stream`] - Little-endian reader/writer over record bytes
//! - [`checksum`] - Record checksums
//! - [`compression`] - QFS (RefPack) codec and compression policy
//! - [`header`] - 96-byte container header and index rows
//! - [`pointer`] - Typed mem-address references between records
//! - [`subfile`] - Registry of record types and their codecs
//! - [`index`] - Item index that resolves pointers
//! - [`entry`] - One container entry with memoised decoding
//! - [`dbpf`] - The container: load, edit, save
//! - [`config`] - Load and save behaviour
//! - [`io`] - File access and atomic replacement
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────┐ 0
//! │ Header (96 bytes)            │
//! ├──────────────────────────────┤ 96
//! │ Entry payloads, in directory │
//! │ order, QFS compressed when   │
//! │ listed in DIR                │
//! ├──────────────────────────────┤ index_offset
//! │ Index table (20 bytes/entry) │
//! └──────────────────────────────┘
//! ```

pub mod checksum;
pub mod compression;
pub mod config;
pub mod dbpf;
pub mod entry;
pub mod error;
pub mod header;
pub mod index;
pub mod io;
pub mod pointer;
pub mod stream;
pub mod subfile;

pub use config::Config;
pub use dbpf::{Dbpf, SaveImage};
pub use entry::{Entry, EntryState};
pub use error::{DbpfError, ErrorKind, Result};
pub use header::{Header, Tgi};
pub use index::{ItemIndex, ItemRef};
pub use pointer::Pointer;
