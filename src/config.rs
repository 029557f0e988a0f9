//! Configuration loading for the harvester.
//!
//! Recognized keys are documented in spec §6; anything else (object-store
//! access key, region, endpoint, ...) is passed through opaquely so callers
//! built on top of this crate can read it back out of `extra`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

fn default_batch_size() -> usize {
    100
}

fn default_workers() -> usize {
    12
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory for PS maps and scratch artifact files.
    pub data_path: PathBuf,

    /// Number of catalog entries accumulated per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker pool size for the download and post-process stages.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// URL prefix joined with the PMC subpath column.
    #[serde(default)]
    pub pmc_base: String,

    /// Empty/absent disables object-store mode in favor of local copies.
    #[serde(default)]
    pub bucket_name: String,

    /// Object-store endpoint, e.g. `https://s3.example.com`. Only consulted
    /// when `bucket_name` is set.
    #[serde(default)]
    pub endpoint: String,

    /// Passthrough for access_key/region/and anything else the configured
    /// object-store client needs but this crate doesn't interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse { source })?;
        if config.data_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingDataPath);
        }
        Ok(config)
    }

    pub fn object_store_enabled(&self) -> bool {
        !self.bucket_name.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config JSON: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
    #[error("config is missing required key `data_path`")]
    MissingDataPath,
}
