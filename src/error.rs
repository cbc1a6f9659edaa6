use thiserror::Error;

#[derive(Error, Debug)]
pub enum MintError {
    #[error("Unknown table or entity type: {0}")]
    UnknownTable(String),

    #[error("Invalid entity type name: {0:?}")]
    InvalidTypeName(String),

    #[error("Invalid registry entry: {0}")]
    InvalidRegistryEntry(String),

    #[error("Device identity unavailable: {0}")]
    DeviceIdentity(String),

    #[error("Malformed ID (no numeric suffix): {0:?}")]
    MalformedId(String),

    #[error("Counter out of range in ID: {0:?}")]
    CounterOverflow(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Registry config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl MintError {
    /// Configuration-class errors are returned to the caller unchanged;
    /// everything else on the allocation path degrades to a cached or
    /// default value instead of failing the call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MintError::UnknownTable(_)
                | MintError::InvalidTypeName(_)
                | MintError::InvalidRegistryEntry(_)
                | MintError::DeviceIdentity(_)
                | MintError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MintError>;
