//! Optional configuration file
//!
//! A small TOML file can provide defaults for the database path, the TTL
//! and verbosity. Command-line flags and environment variables take
//! precedence over anything set here.
//!
//! ```toml
//! db = "/var/tmp/clic.sqlite3"
//! ttl = "5m"
//! verbose = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or contains unknown keys
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings read from the configuration file; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Path of the cache database
    pub db: Option<PathBuf>,
    /// Cache TTL, same syntax as `--ttl`
    pub ttl: Option<String>,
    /// Log verbose information
    pub verbose: Option<bool>,
}

impl FileConfig {
    /// Reads and parses the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
