//! sc4 - SimCity 4 savegame and plugin tool

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sc4_dbpf::core::header::MAGIC;
use sc4_dbpf::core::subfile::exemplar::OCCUPANT_GROUPS;
use sc4_dbpf::core::subfile::{self, FileType};
use sc4_dbpf::pipes::{grid_layout, lay_pipes};
use sc4_dbpf::{Config, Dbpf, Exemplar, FlatTerrain, Header, Savegame, Tgi};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Building styles as stored in `OccupantGroups`
const STYLE_CHICAGO: u32 = 0x0000_2000;
const STYLE_NEW_YORK: u32 = 0x0000_2001;
const STYLE_HOUSTON: u32 = 0x0000_2002;
const STYLE_EURO: u32 = 0x0000_2003;

/// Prefix of generated overrides, sorted last so the game loads them last
const BLOCK_PREFIX: &str = "zzz_BLOCK_";

#[derive(Parser, Debug)]
#[command(name = "sc4")]
#[command(version, about = "Edit SimCity 4 savegames and plugins")]
struct Args {
    /// TOML file with load and save settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mark every lot in a city as historical
    Historical {
        city: PathBuf,

        /// Overwrite the city in place
        #[arg(long)]
        force: bool,

        /// Output path, relative to the city's directory
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Set the tilesets of every building in a plugin directory
    Tileset {
        dir: Option<PathBuf>,

        /// Block all buildings from growing
        #[arg(short = 'b', long)]
        block: bool,

        #[arg(short = 'C', long)]
        chicago: bool,

        #[arg(short = 'N', long)]
        ny: bool,

        #[arg(short = 'H', long)]
        houston: bool,

        #[arg(short = 'E', long)]
        euro: bool,

        /// Scan directories recursively
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// Replace the pipe network of a city with a regular grid
    Pipes {
        city: PathBuf,

        #[arg(long)]
        force: bool,

        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Terrain height the pipes are laid at
        #[arg(long, default_value_t = FlatTerrain::DEFAULT_HEIGHT)]
        height: f32,
    },

    /// Print the header and entry table of a DBPF file as JSON
    Inspect {
        file: PathBuf,

        /// Include the decoded content of every known record
        #[arg(long)]
        records: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Historical {
            city,
            force,
            output,
        } => historical(&city, force, output, config),
        Command::Tileset {
            dir,
            block,
            chicago,
            ny,
            houston,
            euro,
            recursive,
        } => {
            let styles = if block {
                vec![0]
            } else {
                [
                    (chicago, STYLE_CHICAGO),
                    (ny, STYLE_NEW_YORK),
                    (houston, STYLE_HOUSTON),
                    (euro, STYLE_EURO),
                ]
                .into_iter()
                .filter_map(|(on, style)| on.then_some(style))
                .collect()
            };
            let dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            tileset(&dir, &styles, recursive, config)
        }
        Command::Pipes {
            city,
            force,
            output,
            height,
        } => pipes(&city, force, output, height, config),
        Command::Inspect { file, records } => inspect(&file, records, config),
    }
}

fn open_city(path: &Path, config: Config) -> Result<Savegame> {
    if path.extension().and_then(|e| e.to_str()) != Some("sc4") {
        bail!("{} is not a SimCity 4 savegame", path.display());
    }
    info!("Reading {}", path.display());
    Savegame::open_with(path, config).with_context(|| format!("failed to read {}", path.display()))
}

/// Where an edited city goes: in place, the given path, or a prefixed copy
fn output_path(city: &Path, force: bool, output: Option<PathBuf>, prefix: &str) -> PathBuf {
    if force {
        return city.to_path_buf();
    }
    let name = match output {
        Some(output) => output,
        None => {
            let base = city.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            PathBuf::from(format!("{}{}", prefix, base))
        }
    };
    match city.parent() {
        Some(dir) => dir.join(name),
        None => name,
    }
}

fn historical(city: &Path, force: bool, output: Option<PathBuf>, config: Config) -> Result<()> {
    let mut save = open_city(city, config)?;

    let lots = save.lots_mut()?;
    for lot in lots.iter_mut() {
        lot.set_historical(true);
    }
    info!("Marked {} lots as historical", lots.len());

    let out = output_path(city, force, output, "HISTORICAL-");
    info!("Saving {}", out.display());
    save.save(&out)
        .with_context(|| format!("failed to save {}", out.display()))
}

fn pipes(
    city: &Path,
    force: bool,
    output: Option<PathBuf>,
    height: f32,
    config: Config,
) -> Result<()> {
    let mut save = open_city(city, config)?;

    let size = save.plumbing_simulator()?.x_size();
    let layout = grid_layout(size)?;
    let count = lay_pipes(&mut save, &layout, &FlatTerrain::new(height))?;
    info!("Laid {} pipes on a {}x{} city", count, size, size);

    let out = output_path(city, force, output, "PIPES-");
    info!("Saving {}", out.display());
    save.save(&out)
        .with_context(|| format!("failed to save {}", out.display()))
}

fn tileset(dir: &Path, styles: &[u32], recursive: bool, config: Config) -> Result<()> {
    let start = Instant::now();
    info!("Scanning {} (recursive: {})", dir.display(), recursive);

    let mut files = Vec::new();
    collect_files(dir, recursive, &mut files)?;

    for file in files {
        let name = match file.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        if name.starts_with(BLOCK_PREFIX) {
            continue;
        }

        let bytes = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
        if !bytes.starts_with(&MAGIC) {
            continue;
        }

        debug!("Scanning {}", name);
        let mut dbpf = match Dbpf::from_bytes_with(&bytes, config.clone()) {
            Ok(dbpf) => dbpf,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                continue;
            }
        };

        if restyle(&mut dbpf, styles) {
            let out = file.with_file_name(format!("{}{}", BLOCK_PREFIX, name));
            info!("Saving {}", out.display());
            dbpf.save(&out)
                .with_context(|| format!("failed to save {}", out.display()))?;
        }
    }

    info!("Done ({}ms)", start.elapsed().as_millis());
    Ok(())
}

/// Swap the style values of every `OccupantGroups` property for `styles`
fn restyle(dbpf: &mut Dbpf, styles: &[u32]) -> bool {
    let mut changed = false;
    for entry in dbpf.entries_mut() {
        if !matches!(
            FileType::from_u32(entry.type_id()),
            Some(FileType::Exemplar | FileType::Cohort)
        ) {
            continue;
        }
        let tgi = entry.tgi();
        // Text exemplars fail to decode and are left alone
        match entry.read_as::<Exemplar>() {
            Ok(exemplar) if exemplar.get(OCCUPANT_GROUPS).is_some() => {}
            Ok(_) => continue,
            Err(e) => {
                debug!("Skipping exemplar {}: {}", tgi, e);
                continue;
            }
        }

        let groups = entry
            .read_as_mut::<Exemplar>()
            .ok()
            .and_then(|exemplar| exemplar.get_mut(OCCUPANT_GROUPS))
            .and_then(|value| value.as_u32s_mut());
        if let Some(groups) = groups {
            groups.retain(|style| !(STYLE_CHICAGO..=STYLE_EURO).contains(style));
            groups.extend_from_slice(styles);
            changed = true;
        }
    }
    changed
}

fn collect_files(path: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    if !path.is_dir() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    let mut entries = fs::read_dir(path)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            if recursive {
                collect_files(&entry, recursive, out)?;
            }
        } else {
            out.push(entry);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct EntryRow {
    tgi: String,
    offset: u32,
    size: u32,
    decompressed_size: Option<u32>,
    record: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Listing<'a> {
    header: &'a Header,
    entries: Vec<EntryRow>,
}

fn inspect(file: &Path, records: bool, config: Config) -> Result<()> {
    let mut dbpf = Dbpf::open_with(file, config)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut entries = Vec::with_capacity(dbpf.len());
    for entry in dbpf.entries_mut() {
        let tgi: Tgi = entry.tgi();
        let registration = subfile::lookup(tgi.type_id);
        let content = match registration {
            Some(_) if records => Some(match entry.read().and_then(|r| r.to_json()) {
                Ok(json) => json,
                Err(e) => serde_json::Value::String(e.to_string()),
            }),
            _ => None,
        };
        entries.push(EntryRow {
            tgi: tgi.to_string(),
            offset: entry.offset(),
            size: entry.size(),
            decompressed_size: entry.decompressed_size(),
            record: registration.map(|r| r.name),
            content,
        });
    }

    let listing = Listing {
        header: dbpf.header(),
        entries,
    };
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
