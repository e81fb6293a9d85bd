//! Error types for tally-core

use thiserror::Error;

use crate::models::{EntityType, OperationKind};
use crate::remote::RemoteError;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decimal column or payload could not be parsed
    #[error("Invalid decimal: {0}")]
    Decimal(#[from] rust_decimal::Error),

    /// A pending operation chain has no defined reduction
    #[error("Cannot queue {incoming} for {entity_type} {entity_id}: pending chain {chain:?} has no defined reduction")]
    InvalidOperationChain {
        entity_id: i64,
        entity_type: EntityType,
        incoming: OperationKind,
        chain: Vec<OperationKind>,
    },

    /// Remote service error that reached a caller without a local fallback
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
