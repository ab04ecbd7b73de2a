//! LMDB-backed durable store.
//!
//! Uses the heed crate (Rust bindings for LMDB). Keys are the UTF-8 record
//! keys; values are the JSON encoding of the record. The map size is the
//! storage quota: a write that does not fit surfaces as
//! [`StorageError::QuotaExceeded`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bastion_core::StorageError;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, MdbError};
use serde_json::Value as JsonValue;

use crate::store::DurableStore;

fn backend(e: impl ToString) -> StorageError {
    StorageError::Backend {
        reason: e.to_string(),
    }
}

/// Map a heed failure on `key`, recognising a full map as a quota failure.
fn write_error(key: &str, e: heed::Error) -> StorageError {
    match e {
        heed::Error::Mdb(MdbError::MapFull) => StorageError::QuotaExceeded {
            key: key.to_string(),
        },
        other => backend(other),
    }
}

pub struct LmdbDurableStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl LmdbDurableStore {
    /// Open (or create) a store under `path` with a map of `max_size_mb`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&path).map_err(backend)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.max(1) * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(backend)?;

        let mut wtxn = env.write_txn().map_err(backend)?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None).map_err(backend)?;
        wtxn.commit().map_err(backend)?;

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
        })
    }
}

impl std::fmt::Debug for LmdbDurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbDurableStore")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl DurableStore for LmdbDurableStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StorageError> {
        let rtxn = self.env.read_txn().map_err(backend)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(backend)? {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&value).map_err(|e| StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = self.env.write_txn().map_err(backend)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(|e| write_error(key, e))?;
        wtxn.commit().map_err(|e| write_error(key, e))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        let deleted = self.db.delete(&mut wtxn, key.as_bytes()).map_err(backend)?;
        wtxn.commit().map_err(backend)?;
        Ok(deleted)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(backend)?;
        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(backend)? {
            let (key, _) = result.map_err(backend)?;
            if key.starts_with(prefix.as_bytes()) {
                if let Ok(key) = std::str::from_utf8(key) {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }
}
