//! Static registry of tracked tables.
//!
//! The scanner never discovers schema at runtime; the set of
//! `{table, primary key column, entity type}` triples is declared up front,
//! either in code or from a TOML document:
//!
//! ```toml
//! [[table]]
//! table_name = "accounts"
//! primary_key_column = "account_id"
//! entity_type = "Account"
//! ```
//!
//! Registry identifiers are the only strings ever interpolated into scan
//! SQL, so they are validated here against a strict identifier pattern.

use crate::error::{MintError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

fn ident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid literal regex"))
}

/// One tracked table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Canonical table name; doubles as the durable-cache key.
    pub table_name: String,
    /// Column holding the device-prefixed ID.
    pub primary_key_column: String,
    /// Entity type name the services use for this table.
    pub entity_type: String,
}

/// The full set of tracked tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(rename = "table", default)]
    tables: Vec<TableSpec>,
}

impl Registry {
    /// Build a registry from explicit specs, validating every identifier.
    pub fn new(tables: Vec<TableSpec>) -> Result<Self> {
        let registry = Registry { tables };
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a registry from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let registry: Registry = toml::from_str(raw)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load a registry from a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn get(&self, table_name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.table_name == table_name)
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    fn validate(&self) -> Result<()> {
        for spec in &self.tables {
            for ident in [&spec.table_name, &spec.primary_key_column] {
                if !ident_pattern().is_match(ident) {
                    return Err(MintError::InvalidRegistryEntry(format!(
                        "{:?} is not a valid SQL identifier (table {:?})",
                        ident, spec.table_name
                    )));
                }
            }
            if spec.entity_type.trim().is_empty() {
                return Err(MintError::InvalidRegistryEntry(format!(
                    "empty entity type for table {:?}",
                    spec.table_name
                )));
            }
            let duplicates = self
                .tables
                .iter()
                .filter(|t| t.table_name == spec.table_name)
                .count();
            if duplicates > 1 {
                return Err(MintError::InvalidRegistryEntry(format!(
                    "duplicate table {:?}",
                    spec.table_name
                )));
            }
        }
        Ok(())
    }
}
