//! Error types for configuration loading.

use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The `config` crate failed to build or deserialize the layered
    /// configuration (missing file, YAML syntax error, type mismatch).
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// IO error reading a config file from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;
