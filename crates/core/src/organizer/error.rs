//! Error types for the organizer module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a reorganization run.
///
/// Records that cannot be resolved are not errors; they are reported in
/// the run summary.
#[derive(Debug, Error)]
pub enum OrganizerError {
    /// The tabular metadata file does not exist.
    #[error("Metadata table not found: {0}")]
    TableNotFound(PathBuf),

    /// The asset tree to reorganize does not exist.
    #[error("Asset directory not found: {0}")]
    AssetRootNotFound(PathBuf),

    /// File extension is not a supported table format.
    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),

    /// A required mapping key is missing or empty.
    #[error("Mapping is missing required field '{0}'")]
    MissingMappingField(&'static str),

    /// The mapping file is not a valid two-section object.
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task failed to complete.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<calamine::Error> for OrganizerError {
    fn from(err: calamine::Error) -> Self {
        Self::Spreadsheet(err.to_string())
    }
}
