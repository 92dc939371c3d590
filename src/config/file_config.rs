use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,
    /// Database engine name: "sqlite", "postgres" or "mysql"
    pub engine: Option<String>,
    /// Trailing window used by the stats commands when none is given
    pub default_hours: Option<i64>,
    /// Stored payloads are cut to this many bytes
    pub payload_max_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
