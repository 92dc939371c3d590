mod file_config;

pub use file_config::FileConfig;

use crate::dialect::DatabaseEngine;
use crate::hooks::{DatabaseNotificationHook, TruncatingPolicy};
use crate::job_store::{JobRecordStore, SqliteJobStore};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_HOURS: i64 = 1;

/// CLI arguments that can be overridden by the TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub engine: Option<String>,
    pub default_hours: i64,
    pub payload_max_bytes: Option<usize>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            engine: None,
            default_hours: DEFAULT_HOURS,
            payload_max_bytes: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub engine: DatabaseEngine,
    pub default_hours: i64,
    pub payload_max_bytes: Option<usize>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db or in config file")
            })?;

        let engine = file
            .engine
            .or_else(|| cli.engine.clone())
            .map(|name| DatabaseEngine::from_name(&name))
            .unwrap_or(DatabaseEngine::Sqlite);
        if let DatabaseEngine::Other(name) = &engine {
            bail!("Unsupported database engine: {}", name);
        }

        let default_hours = file.default_hours.unwrap_or(cli.default_hours);
        if default_hours <= 0 {
            bail!("default_hours must be positive, got {}", default_hours);
        }

        let payload_max_bytes = file.payload_max_bytes.or(cli.payload_max_bytes);

        Ok(Self {
            db_path,
            engine,
            default_hours,
            payload_max_bytes,
        })
    }

    /// Opens the configured database, creating or migrating it as needed.
    pub fn open_store(&self) -> Result<SqliteJobStore> {
        if self.engine != DatabaseEngine::Sqlite {
            bail!(
                "Only sqlite databases can be opened directly, configured engine is {}",
                self.engine
            );
        }
        SqliteJobStore::new(&self.db_path)
    }

    /// Lifecycle hook over `store`, truncating payloads if so configured.
    pub fn notification_hook(&self, store: Arc<dyn JobRecordStore>) -> DatabaseNotificationHook {
        match self.payload_max_bytes {
            Some(max_bytes) => {
                DatabaseNotificationHook::with_policy(store, TruncatingPolicy::new(max_bytes))
            }
            None => DatabaseNotificationHook::new(store),
        }
    }
}
