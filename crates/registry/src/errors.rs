//! Error types for the identity registry core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to parse wallet address: {0}")]
    AddressParse(#[from] namereg_types::AddressError),

    #[error("invalid name: {0}")]
    InvalidName(#[from] namereg_types::NameError),

    #[error("name '{name}' is already taken")]
    NameTaken { name: String },

    #[error("name '{name}' is already registered to this identity, use update")]
    DuplicateRegistration { name: String },

    #[error("no identity found for {key}")]
    NotFound { key: String },

    #[error("field '{field}' cannot be changed after creation")]
    ImmutableField { field: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] namereg_storage::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
