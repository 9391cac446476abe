//! Types for the packer module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::organizer::{ORGANIZED_DIR, ORGANIZED_THUMBNAILS_DIR};

/// A directory tree and the folder it maps to inside the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSource {
    pub path: PathBuf,
    /// Archive folder for this tree; empty for the archive root.
    pub archive_root: String,
}

impl PackSource {
    pub fn new(path: impl Into<PathBuf>, archive_root: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            archive_root: archive_root.into(),
        }
    }

    /// Sources for a reorganized output root: `organized/` at the archive
    /// root, `organized_thumbnails/` under `thumbnails_root` when present.
    pub fn organized_layout(output_root: &Path, thumbnails_root: &str) -> Vec<Self> {
        let mut sources = vec![Self::new(output_root.join(ORGANIZED_DIR), "")];
        let thumbs = output_root.join(ORGANIZED_THUMBNAILS_DIR);
        if thumbs.is_dir() {
            sources.push(Self::new(thumbs, thumbnails_root));
        }
        sources
    }

    /// Archive path of `relative` (slash separated) inside this source.
    pub fn archive_name(&self, relative: &str) -> String {
        let root = self.archive_root.trim_matches('/');
        if root.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", root, relative)
        }
    }
}

/// A file stored in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    /// Slash-separated path inside the archive.
    pub name: String,
}

/// A top-level entry of the primary source plus its matching subtrees
/// from the other sources. Items are never split across parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackItem {
    pub name: String,
    pub entries: Vec<ArchiveEntry>,
}

/// One archive produced by a pack run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedPart {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Files stored in this part.
    pub entries: usize,
    /// Top-level items stored in this part.
    pub items: Vec<String>,
    /// A single item that alone exceeds the size ceiling.
    pub oversize: bool,
}

/// Outcome of a pack run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSummary {
    pub parts: Vec<PackedPart>,
    /// Set when a stop request ended the run before every item was packed.
    pub stopped: bool,
}
