//! Allocation state caches.
//!
//! Two layers hold the last-assigned ID per table:
//!
//! - an in-memory map that lives for the process (the warm path), and
//! - a durable key/value store that survives restarts (the cold-start
//!   source of truth).
//!
//! Writes go through to the durable layer synchronously; reads prefer
//! memory. The two may transiently disagree (a failed durable write is
//! logged, not fatal) and converge on the next successful write or
//! reconciliation. All access is serialized by the allocator's lock; the
//! SQLite-backed durable store carries its own inner mutex only because
//! `rusqlite::Connection` is not `Sync`.

use crate::codec;
use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Per-table allocation state, one durable entry per tracked table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Canonical table name; also the durable-cache key.
    pub table_name: String,
    /// Entity type the services use for this table.
    pub entity_type: String,
    /// Last ID handed out for this table, if any.
    pub last_assigned_id: Option<String>,
}

impl AllocationRecord {
    /// The last-assigned ID, but only when it matches the canonical ID
    /// pattern. A corrupt value is treated as absent.
    pub fn valid_id(&self) -> Option<&str> {
        match self.last_assigned_id.as_deref() {
            Some(id) if codec::is_canonical(id) => Some(id),
            Some(id) => {
                warn!(table = %self.table_name, id, "discarding non-canonical cached ID");
                None
            }
            None => None,
        }
    }
}

/// Durable key/value collaborator, scoped per installation.
///
/// Values are opaque strings: serialized [`AllocationRecord`]s keyed by
/// table name, plus the device-tag keys from [`crate::device`].
pub trait DurableCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Volatile [`DurableCache`] for tests and for embedders that handle
/// persistence themselves.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

const CACHE_TABLE_DDL: &str =
    "CREATE TABLE IF NOT EXISTS tagmint_cache (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

/// SQLite-backed [`DurableCache`], one row per key in `tagmint_cache`.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (and initialize if needed) a cache at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory cache; state lives as long as the value.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection, e.g. the application's own database.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(CACHE_TABLE_DDL, [])?;
        Ok(SqliteCache {
            conn: Mutex::new(conn),
        })
    }
}

impl DurableCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM tagmint_cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tagmint_cache (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

/// The two-layer allocation cache: in-memory records with synchronous
/// write-through to the durable layer.
pub struct AllocationCache {
    memory: HashMap<String, AllocationRecord>,
    durable: Arc<dyn DurableCache>,
}

impl AllocationCache {
    pub fn new(durable: Arc<dyn DurableCache>) -> Self {
        AllocationCache {
            memory: HashMap::new(),
            durable,
        }
    }

    /// Warm-path lookup: the last-assigned ID held in memory.
    pub fn get(&self, table: &str) -> Option<&str> {
        self.memory.get(table).and_then(|rec| rec.valid_id())
    }

    /// Cold-path lookup: read and deserialize the durable record. A record
    /// that fails to parse is corruption, reported as absent.
    pub fn load_durable(&self, table: &str) -> Result<Option<AllocationRecord>> {
        let Some(raw) = self.durable.get(table)? else {
            return Ok(None);
        };
        match serde_json::from_str::<AllocationRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(table, %err, "discarding corrupt durable allocation record");
                Ok(None)
            }
        }
    }

    /// Install a record into the memory layer only (no durable write).
    pub fn adopt(&mut self, record: AllocationRecord) {
        self.memory.insert(record.table_name.clone(), record);
    }

    /// Record `id` as the last-assigned value for `table`, writing through
    /// to the durable layer. The memory layer is updated even when the
    /// durable write fails; the error is returned for the caller to log.
    pub fn set(&mut self, table: &str, entity_type: &str, id: &str) -> Result<()> {
        let record = AllocationRecord {
            table_name: table.to_string(),
            entity_type: entity_type.to_string(),
            last_assigned_id: Some(id.to_string()),
        };
        let serialized = serde_json::to_string(&record)?;
        self.memory.insert(table.to_string(), record);
        self.durable.set(table, &serialized)?;
        Ok(())
    }

    /// Roll back every table whose last-assigned ID equals `released` to
    /// `predecessor`. Returns the affected tables; durable write failures
    /// are logged, not propagated.
    pub fn rollback(&mut self, released: &str, predecessor: &str) -> Vec<String> {
        let affected: Vec<String> = self
            .memory
            .iter()
            .filter(|(_, rec)| rec.last_assigned_id.as_deref() == Some(released))
            .map(|(table, _)| table.clone())
            .collect();
        for table in &affected {
            let entity_type = self.memory[table].entity_type.clone();
            if let Err(err) = self.set(table, &entity_type, predecessor) {
                warn!(%table, %err, "durable write failed while rolling back release");
            }
        }
        affected
    }

    /// Number of tables with warm in-memory state.
    pub fn warm_len(&self) -> usize {
        self.memory.len()
    }

    pub fn durable(&self) -> &Arc<dyn DurableCache> {
        &self.durable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> AllocationCache {
        AllocationCache::new(Arc::new(MemoryCache::new()))
    }

    #[test]
    fn set_writes_through_and_load_durable_round_trips() {
        let mut cache = cache();
        cache.set("accounts", "Account", "AAA-01").unwrap();
        assert_eq!(cache.get("accounts"), Some("AAA-01"));

        let record = cache.load_durable("accounts").unwrap().unwrap();
        assert_eq!(record.table_name, "accounts");
        assert_eq!(record.entity_type, "Account");
        assert_eq!(record.last_assigned_id.as_deref(), Some("AAA-01"));
    }

    #[test]
    fn corrupt_durable_value_reads_as_absent() {
        let durable = Arc::new(MemoryCache::new());
        durable.set("accounts", "not json at all").unwrap();
        let cache = AllocationCache::new(durable);
        assert!(cache.load_durable("accounts").unwrap().is_none());
    }

    #[test]
    fn non_canonical_id_reads_as_absent() {
        let mut cache = cache();
        cache.adopt(AllocationRecord {
            table_name: "accounts".to_string(),
            entity_type: "Account".to_string(),
            last_assigned_id: Some("garbage".to_string()),
        });
        assert_eq!(cache.get("accounts"), None);
    }

    #[test]
    fn rollback_rewinds_matching_tables_only() {
        let mut cache = cache();
        cache.set("accounts", "Account", "AAA-05").unwrap();
        cache.set("transactions", "Transaction", "AAA-09").unwrap();

        let affected = cache.rollback("AAA-05", "AAA-04");
        assert_eq!(affected, vec!["accounts".to_string()]);
        assert_eq!(cache.get("accounts"), Some("AAA-04"));
        assert_eq!(cache.get("transactions"), Some("AAA-09"));
    }

    #[test]
    fn sqlite_cache_upserts() {
        let cache = SqliteCache::open_in_memory().unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        cache.set("k", "v1").unwrap();
        cache.set("k", "v2").unwrap();
        assert_eq!(cache.get("k").unwrap(), Some("v2".to_string()));
    }
}
