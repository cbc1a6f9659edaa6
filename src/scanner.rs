//! Relational-store scans that recover the authoritative last-used ID.
//!
//! After a reinstall or a wiped cache the store itself is the only record
//! of what this device has already handed out. Per table, the scan asks:
//! among rows whose primary key contains the device tag, which key is the
//! maximum — preferring the longest key, breaking length ties lexically?
//! The length preference models counter overflow: `AAA-012` must beat
//! `AAA-99` even though `99` sorts higher within equal widths.

use crate::device::DeviceTag;
use crate::error::{MintError, Result};
use crate::registry::{Registry, TableSpec};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Relational-store collaborator: answers the max-matching-key question
/// per table.
pub trait RecordStore: Send + Sync {
    /// Maximum primary key of `table` containing `fragment`, preferring
    /// the longest key and breaking length ties with a lexical comparison.
    fn max_matching_id(&self, table: &TableSpec, fragment: &str) -> Result<Option<String>>;
}

/// [`RecordStore`] over a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Wrap the application's own connection.
    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn: Mutex::new(conn),
        }
    }
}

impl RecordStore for SqliteStore {
    fn max_matching_id(&self, table: &TableSpec, fragment: &str) -> Result<Option<String>> {
        // Identifiers come from the validated registry, never from callers;
        // only the match fragment travels as a bound parameter.
        let sql = format!(
            "SELECT {pk} FROM {table} WHERE {pk} LIKE ?1 \
             ORDER BY LENGTH({pk}) DESC, {pk} DESC LIMIT 1",
            pk = table.primary_key_column,
            table = table.table_name,
        );
        let pattern = format!("%{fragment}%");
        let conn = self.conn.lock();
        let found = conn
            .query_row(&sql, params![pattern], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(found)
    }
}

/// Per-table scan driver, built once per device tag.
pub struct DatabaseScanner {
    store: Arc<dyn RecordStore>,
    registry: Registry,
}

impl DatabaseScanner {
    pub fn new(store: Arc<dyn RecordStore>, registry: Registry) -> Self {
        DatabaseScanner { store, registry }
    }

    /// Scan one table for the maximum ID carrying `tag`.
    ///
    /// Unknown tables are a configuration error; an empty result set is
    /// `Ok(None)`.
    pub fn scan_table(&self, table: &str, tag: &DeviceTag) -> Result<Option<String>> {
        let spec = self
            .registry
            .get(table)
            .ok_or_else(|| MintError::UnknownTable(table.to_string()))?;
        let found = self.store.max_matching_id(spec, tag.as_str())?;
        debug!(table, tag = %tag, found = found.as_deref().unwrap_or("<none>"), "store scan");
        Ok(found)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
