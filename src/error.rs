use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum SpesaError {
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    /// The inference backend credential is not set
    #[error("Missing credential: {0} is not set in the config file or environment")]
    MissingCredential(String),

    /// The inference backend could not be constructed
    #[error("Backend error: {0}")]
    BackendError(#[from] BackendError),

    /// The snapshot could not be serialized
    #[error("Failed to serialize snapshot: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// The snapshot could not be written to disk
    #[error("Failed to write snapshot {}: {source}", path.display())]
    PersistError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder configuration error
    #[error("Builder error: {0}")]
    BuilderError(String),
}
