//! Configuration for the processor module.

use serde::{Deserialize, Serialize};

use crate::converter::ThumbnailVariant;
use crate::walker::WalkerConfig;

/// Configuration for the asset pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory names never entered.
    #[serde(default = "default_excluded_names")]
    pub excluded_names: Vec<String>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum path length in characters.
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,

    /// Image workers used when no resource probe is attached.
    #[serde(default = "default_fallback_image_workers")]
    pub fallback_image_workers: usize,

    /// Hard cap on concurrent video tasks.
    #[serde(default = "default_video_concurrency")]
    pub video_concurrency: usize,

    /// Images processed in preview mode.
    #[serde(default = "default_preview_sample_size")]
    pub preview_sample_size: usize,

    /// Refuse to start when the resource probe reports memory pressure.
    #[serde(default)]
    pub refuse_on_low_memory: bool,

    /// Long edge cap for derivatives, in pixels.
    #[serde(default = "default_max_long_edge")]
    pub max_long_edge: u32,

    /// Extension of produced derivatives.
    #[serde(default = "default_derivative_extension")]
    pub derivative_extension: String,

    /// Thumbnail variants produced for every image and video.
    #[serde(default = "default_thumbnails")]
    pub thumbnails: Vec<ThumbnailVariant>,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    #[serde(default = "default_xml_extensions")]
    pub xml_extensions: Vec<String>,
}

fn default_excluded_names() -> Vec<String> {
    ["thumbnails", "organized", "organized_thumbnails", ".git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_depth() -> usize {
    50
}

fn default_max_path_len() -> usize {
    3500
}

fn default_fallback_image_workers() -> usize {
    2
}

fn default_video_concurrency() -> usize {
    2
}

fn default_preview_sample_size() -> usize {
    4
}

fn default_max_long_edge() -> u32 {
    3840
}

fn default_derivative_extension() -> String {
    "webp".to_string()
}

fn default_thumbnails() -> Vec<ThumbnailVariant> {
    vec![
        ThumbnailVariant::new("low_quality", 320),
        ThumbnailVariant::new("gallery", 1600),
        ThumbnailVariant::new("book", 800).crop_only(),
    ]
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "tif", "tiff", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mov", "avi", "mkv", "m4v", "webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_xml_extensions() -> Vec<String> {
    vec!["xml".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            excluded_names: default_excluded_names(),
            max_depth: default_max_depth(),
            max_path_len: default_max_path_len(),
            fallback_image_workers: default_fallback_image_workers(),
            video_concurrency: default_video_concurrency(),
            preview_sample_size: default_preview_sample_size(),
            refuse_on_low_memory: false,
            max_long_edge: default_max_long_edge(),
            derivative_extension: default_derivative_extension(),
            thumbnails: default_thumbnails(),
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
            xml_extensions: default_xml_extensions(),
        }
    }
}

impl PipelineConfig {
    /// Sets the excluded directory names.
    pub fn with_excluded_names(mut self, names: Vec<String>) -> Self {
        self.excluded_names = names;
        self
    }

    /// Sets the fallback image worker count.
    pub fn with_fallback_workers(mut self, workers: usize) -> Self {
        self.fallback_image_workers = workers;
        self
    }

    /// Replaces the thumbnail variants.
    pub fn with_thumbnails(mut self, thumbnails: Vec<ThumbnailVariant>) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    /// Walker settings derived from this config.
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            excluded_names: self.excluded_names.clone(),
            max_depth: self.max_depth,
            max_path_len: self.max_path_len,
        }
    }

    /// Variants generated straight from the derivative.
    pub fn standard_thumbnails(&self) -> impl Iterator<Item = &ThumbnailVariant> {
        self.thumbnails.iter().filter(|t| !t.crop_only)
    }

    /// Variants generated from the cropped working copy.
    pub fn crop_thumbnails(&self) -> impl Iterator<Item = &ThumbnailVariant> {
        self.thumbnails.iter().filter(|t| t.crop_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_depth, 50);
        assert_eq!(config.max_path_len, 3500);
        assert_eq!(config.video_concurrency, 2);
        assert_eq!(config.preview_sample_size, 4);
        assert_eq!(config.max_long_edge, 3840);
        assert!(config.excluded_names.contains(&"thumbnails".to_string()));
    }

    #[test]
    fn test_thumbnail_partition() {
        let config = PipelineConfig::default();
        let standard: Vec<_> = config.standard_thumbnails().map(|t| t.name.as_str()).collect();
        let cropped: Vec<_> = config.crop_thumbnails().map(|t| t.name.as_str()).collect();
        assert_eq!(standard, vec!["low_quality", "gallery"]);
        assert_eq!(cropped, vec!["book"]);
    }

    #[test]
    fn test_walker_config() {
        let config = PipelineConfig::default().with_excluded_names(vec!["skip".to_string()]);
        let walker = config.walker_config();
        assert_eq!(walker.excluded_names, vec!["skip".to_string()]);
        assert_eq!(walker.max_depth, 50);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str("video_concurrency = 1").unwrap();
        assert_eq!(config.video_concurrency, 1);
        assert_eq!(config.fallback_image_workers, 2);
        assert_eq!(config.thumbnails.len(), 3);
    }
}
