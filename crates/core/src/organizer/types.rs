//! Types for the organizer module.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Progress after each record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeProgress {
    /// Records handled so far, including skipped ones.
    pub current: usize,
    pub total: usize,
    pub identifier: String,
    /// Where the primary asset was copied; `None` when the record was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
}

/// Why a record produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingGroup,
    MissingIdentifier,
    /// The group value slugifies to an empty string.
    EmptySlug,
    OriginFolderNotFound { origin_folder: String },
    AssetNotFound,
    CopyFailed { message: String },
}

/// A record that was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// 1-based data row number.
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Accumulated output for one slug folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFolder {
    pub document: Map<String, Value>,
    pub images: Vec<Value>,
    /// Identifiers already added, in insertion order.
    #[serde(skip)]
    pub identifiers: Vec<String>,
}

impl DocumentFolder {
    /// Appends an image unless `identifier` is already present.
    pub fn add_image(&mut self, identifier: &str, fields: Map<String, Value>) -> bool {
        if self.identifiers.iter().any(|id| id == identifier) {
            return false;
        }
        self.identifiers.push(identifier.to_string());
        self.images.push(Value::Object(fields));
        true
    }
}

/// Final report of a reorganization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizeSummary {
    pub total_records: usize,
    pub processed: usize,
    pub skipped: Vec<SkippedRecord>,
    /// Slugs that received a metadata.json.
    pub folders: Vec<String>,
    pub missing_thumbnails: usize,
    /// True when a stop request cut the run short.
    pub stopped: bool,
}
