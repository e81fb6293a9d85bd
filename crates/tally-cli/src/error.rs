use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid amount '{0}': use a positive decimal such as 12.50")]
    InvalidAmount(String),
    #[error("Invalid date '{0}': use YYYY-MM-DD or an RFC 3339 timestamp")]
    InvalidDate(String),
    #[error("Nothing to change: pass at least one field to update")]
    NothingToUpdate,
    #[error("Configuration error: {0}")]
    Config(String),
}
