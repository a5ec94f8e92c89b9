use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid authorization model or policy: {0}")]
    Casbin(#[from] casbin::Error),

    #[error("Invalid policy rule on line {line}: {message}")]
    InvalidRule { line: usize, message: String },
}
