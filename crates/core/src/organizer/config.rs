//! Configuration for the organizer module.

use serde::{Deserialize, Serialize};

/// Configuration for document reorganization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizerConfig {
    /// Thumbnail variants copied next to each organized asset.
    #[serde(default = "default_thumbnail_variants")]
    pub thumbnail_variants: Vec<String>,

    /// Extension of the derivatives to index.
    #[serde(default = "default_derivative_extension")]
    pub derivative_extension: String,

    /// Directory names skipped while indexing the asset tree.
    #[serde(default = "default_excluded_names")]
    pub excluded_names: Vec<String>,
}

fn default_thumbnail_variants() -> Vec<String> {
    vec!["low_quality".to_string(), "gallery".to_string()]
}

fn default_derivative_extension() -> String {
    "webp".to_string()
}

fn default_excluded_names() -> Vec<String> {
    ["thumbnails", "organized", "organized_thumbnails", ".git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            thumbnail_variants: default_thumbnail_variants(),
            derivative_extension: default_derivative_extension(),
            excluded_names: default_excluded_names(),
        }
    }
}

impl OrganizerConfig {
    pub fn with_thumbnail_variants(mut self, variants: Vec<String>) -> Self {
        self.thumbnail_variants = variants;
        self
    }
}
