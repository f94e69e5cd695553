//! On-disk query result cache.
//!
//! Each entry is a bincode file under the cache directory, named by the
//! SHA-256 hex of the normalized SQL text plus its rendered parameters.
//! Entries carry a format version and a creation timestamp; anything stale,
//! corrupt, or version-mismatched is reported as an error the executor
//! treats as a miss.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::table::{Table, Value};

/// Cache errors. All of them are recoverable from the executor's point of
/// view: the query is simply re-run.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache entry not found")]
    NotFound,

    #[error("cache entry expired")]
    Stale,

    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// Serialized entry layout.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    version: u32,
    /// Unix seconds at store time.
    created_at: i64,
    table: Table,
}

/// File-per-entry cache with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct QueryCache {
    dir: PathBuf,
    ttl: Duration,
}

impl QueryCache {
    /// Current entry format version.
    const CACHE_VERSION: u32 = 1;

    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic key for a query: SHA-256 over the whitespace-normalized
    /// SQL followed by each rendered parameter on its own line.
    pub fn key(sql: &str, params: &[Value]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalize_sql(sql).as_bytes());
        for param in params {
            hasher.update(b"\n");
            hasher.update(param.to_field().as_bytes());
        }
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }

    /// Load a fresh entry. Stale entries and anything unreadable are removed
    /// from disk before the error is returned.
    pub fn load(&self, key: &str) -> Result<Table, CacheError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Err(CacheError::NotFound);
        }

        let data = std::fs::read(&path).map_err(|e| CacheError::Io(e.to_string()))?;
        let stored: StoredEntry = match bincode::deserialize(&data) {
            Ok(stored) => stored,
            Err(e) => {
                self.discard(key);
                return Err(CacheError::Deserialize(e.to_string()));
            }
        };

        if stored.version != Self::CACHE_VERSION {
            self.discard(key);
            return Err(CacheError::VersionMismatch {
                expected: Self::CACHE_VERSION,
                found: stored.version,
            });
        }

        let age = chrono::Utc::now().timestamp() - stored.created_at;
        if age < 0 || age as u64 > self.ttl.as_secs() {
            self.discard(key);
            return Err(CacheError::Stale);
        }

        log::debug!("cache hit for {key} ({} rows, age {age}s)", stored.table.len());
        Ok(stored.table)
    }

    /// Store a result under `key`, stamping the current time.
    pub fn store(&self, key: &str, table: &Table) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io(e.to_string()))?;

        let stored = StoredEntry {
            version: Self::CACHE_VERSION,
            created_at: chrono::Utc::now().timestamp(),
            table: table.clone(),
        };
        let data = bincode::serialize(&stored).map_err(|e| CacheError::Serialize(e.to_string()))?;
        std::fs::write(self.entry_path(key), &data).map_err(|e| CacheError::Io(e.to_string()))?;

        log::debug!("cached {} rows under {key} ({} bytes)", table.len(), data.len());
        Ok(())
    }

    /// Drop a single entry if present. Errors are ignored; a leftover file
    /// just re-triggers the miss path later.
    pub fn discard(&self, key: &str) {
        let _ = std::fs::remove_file(self.entry_path(key));
    }

    /// Remove every entry in the cache directory.
    pub fn clear(&self) -> Result<(), CacheError> {
        if !self.dir.exists() {
            return Ok(());
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CacheError::Io(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Io(e.to_string()))?;
            if entry.path().extension().is_some_and(|ext| ext == "bin") {
                std::fs::remove_file(entry.path()).map_err(|e| CacheError::Io(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Collapse runs of whitespace so formatting differences do not defeat the
/// cache key.
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
