use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the admission core
#[derive(Error, Debug)]
pub enum LoiterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "counter region '{path}' has size {actual} bytes, expected {expected}; \
         remove the stale region before using the new layout"
    )]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("could not acquire region lock after {attempts} attempts")]
    LockTimeout { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, LoiterError>;
