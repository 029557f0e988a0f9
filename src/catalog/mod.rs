//! Catalog Reader (CR): format-aware streaming reader for Unpaywall and
//! PMC inputs, with optional sampling (spec §4.1).

mod pmc;
mod sampling;
mod unpaywall;

pub use pmc::PmcSource;
pub use sampling::Sampler;
pub use unpaywall::UnpaywallSource;

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Entry;
use crate::store::{PersistentStore, StoreError};

/// One unit of work handed to the Batch Engine: where to fetch from, where
/// to write the download, and the Entry it belongs to.
#[derive(Debug, Clone)]
pub struct FetchItem {
    pub url: String,
    pub destination: PathBuf,
    pub entry: Entry,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog line: {0}")]
    Parse(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A source of catalog lines, lazily yielding `FetchItem`s already
/// deduplicated against `DoiIndex` and filtered per format rules.
///
/// Implementations consult the store themselves (rather than returning raw
/// lines for the caller to dedup) because dedup is a per-line, source-order
/// concern specific to each format (spec §4.1).
pub trait CatalogSource {
    fn next_item(&mut self, store: &PersistentStore) -> Result<Option<FetchItem>, CatalogError>;
}
