//! Persistent Store (PS): three independently-opened `sled` databases
//! sharing a data directory (spec §4.5).
//!
//! `entries` (id -> Entry), `doi` (doi -> id), and `fail` (id -> error
//! token) are opened once for the process lifetime and threaded explicitly
//! through `BatchEngine`/`Controller` rather than kept as global state
//! (spec §9's "global mutable state" note).

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::models::Entry;

const SCHEMA_KEY: &[u8] = b"__schema_version__";
const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("persistent store I/O error: {0}")]
    Sled(#[from] sled::Error),
    #[error("persistent store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct PersistentStore {
    data_path: PathBuf,
    entries: sled::Db,
    doi: sled::Db,
    fail: sled::Db,
}

impl PersistentStore {
    pub fn open(data_path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_path).map_err(|source| StoreError::Io {
            path: data_path.to_path_buf(),
            source,
        })?;

        let entries = sled::open(data_path.join("entries"))?;
        let doi = sled::open(data_path.join("doi"))?;
        let fail = sled::open(data_path.join("fail"))?;

        if entries.get(SCHEMA_KEY)?.is_none() {
            entries.insert(SCHEMA_KEY, serde_json::to_vec(&SCHEMA_VERSION)?)?;
        }

        Ok(Self {
            data_path: data_path.to_path_buf(),
            entries,
            doi,
            fail,
        })
    }

    /// Close all three maps, remove their backing directories, re-open
    /// fresh, then sweep the data directory for stray artifact files
    /// (spec §4.5 "Reset").
    pub fn reset(data_path: &Path) -> Result<Self, StoreError> {
        for name in ["entries", "doi", "fail"] {
            let dir = data_path.join(name);
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?;
            }
        }

        let store = Self::open(data_path)?;

        if let Ok(read_dir) = std::fs::read_dir(data_path) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_file() {
                    let matches = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| matches!(ext, "pdf" | "png" | "nxml"))
                        .unwrap_or(false)
                        || path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| n.ends_with(".tar.gz"))
                            .unwrap_or(false);
                    if matches {
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
        }

        Ok(store)
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn get_id_by_doi(&self, doi: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .doi
            .get(doi.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Write an Entry to `entries` and its `(doi -> id)` pair to `doi`, each
    /// in its own transaction, per spec §4.3 (done on both success and
    /// failure so a known-bad URL is never re-fetched).
    pub fn put_entry(&self, entry: &Entry) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(entry)?;
        self.entries
            .transaction(|tx| {
                tx.insert(entry.id.as_bytes(), bytes.clone())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<StoreError>>(())
            })
            .map_err(flatten_tx_err)?;

        self.doi
            .transaction(|tx| {
                tx.insert(entry.doi.as_bytes(), entry.id.as_bytes())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<StoreError>>(())
            })
            .map_err(flatten_tx_err)?;

        Ok(())
    }

    pub fn put_failure(&self, id: &str, token: &str) -> Result<(), StoreError> {
        self.fail
            .transaction(|tx| {
                tx.insert(id.as_bytes(), token.as_bytes())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<StoreError>>(())
            })
            .map_err(flatten_tx_err)?;
        Ok(())
    }

    pub fn clear_failure(&self, id: &str) -> Result<(), StoreError> {
        self.fail
            .transaction(|tx| {
                tx.remove(id.as_bytes())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<StoreError>>(())
            })
            .map_err(flatten_tx_err)?;
        Ok(())
    }

    pub fn get_entry(&self, id: &str) -> Result<Option<Entry>, StoreError> {
        match self.entries.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All `(id, error_token)` pairs currently recorded as failed.
    pub fn iter_failures(&self) -> impl Iterator<Item = Result<(String, String), StoreError>> + '_ {
        self.fail.iter().map(|res| {
            let (k, v) = res?;
            Ok((
                String::from_utf8_lossy(&k).into_owned(),
                String::from_utf8_lossy(&v).into_owned(),
            ))
        })
    }

    /// Every Entry in the store, in cursor order (spec §4.6 "dump").
    pub fn iter_entries(&self) -> impl Iterator<Item = Result<Entry, StoreError>> + '_ {
        self.entries.iter().filter_map(|res| match res {
            Ok((k, _)) if k.as_ref() == SCHEMA_KEY => None,
            Ok((k, v)) => Some((|| {
                let mut entry: Entry = serde_json::from_slice(&v)?;
                entry.id = String::from_utf8_lossy(&k).into_owned();
                Ok(entry)
            })()),
            Err(e) => Some(Err(e.into())),
        })
    }

    /// `(fail_count, total_count)`, used by `diagnostic`.
    pub fn stats(&self) -> Result<(u64, u64), StoreError> {
        let total = self.entries.len() as u64;
        let total = total.saturating_sub(1); // exclude the schema-version key
        let fail = self.fail.len() as u64;
        Ok((fail, total))
    }

    pub fn schema_version(&self) -> Result<Option<Value>, StoreError> {
        match self.entries.get(SCHEMA_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn flatten_tx_err(
    e: sled::transaction::TransactionError<StoreError>,
) -> StoreError {
    match e {
        sled::transaction::TransactionError::Abort(inner) => inner,
        sled::transaction::TransactionError::Storage(e) => StoreError::Sled(e),
    }
}
