use crate::core::compression::CompressionConfig;
use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Load and save behaviour of a container
///
/// ```toml
/// strict_checksums = false
/// touch_modified = true
///
/// [compression]
/// threshold = 128
/// max_chain = 8
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Policy for entries that have no compression method yet
    pub compression: CompressionConfig,

    /// Fail reads of records whose stored checksum is stale
    pub strict_checksums: bool,

    /// Refresh the header's modified date on save
    pub touch_modified: bool,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
