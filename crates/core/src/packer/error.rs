//! Error types for the packer module.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackerError {
    /// No source trees were given.
    #[error("No sources to pack")]
    NoSources,

    /// The primary source tree does not exist.
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),

    /// A part limit of zero can never be satisfied.
    #[error("Maximum part size must be greater than zero")]
    InvalidPartSize,

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking build task failed to complete.
    #[error("Internal error: {0}")]
    Internal(String),
}
