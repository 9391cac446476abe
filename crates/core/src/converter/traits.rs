//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ConverterError;
use super::types::{CropOutcome, ImageJob, ThumbnailJob};

/// Delegates CPU-heavy media work to external tools.
///
/// Every call spawns one short-lived subprocess and waits for it; the
/// caller bounds how many run at once.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Encodes a source image into its compressed derivative.
    async fn convert_image(&self, job: &ImageJob) -> Result<(), ConverterError>;

    /// Crops a derivative into a working copy at `output`.
    async fn crop_image(&self, input: &Path, output: &Path)
        -> Result<CropOutcome, ConverterError>;

    /// Produces one resized thumbnail.
    async fn make_thumbnail(&self, job: &ThumbnailJob) -> Result<(), ConverterError>;

    /// Checks that the video transcoder can be executed.
    async fn validate_video(&self) -> Result<(), ConverterError>;

    /// Transcodes a video into the configured web profile.
    async fn transcode_video(&self, input: &Path, output: &Path) -> Result<(), ConverterError>;

    /// Writes a single still frame of `input` to `output`.
    async fn extract_frame(&self, input: &Path, output: &Path) -> Result<(), ConverterError>;

    /// Container extension of transcoded videos.
    fn video_extension(&self) -> &str {
        "mp4"
    }
}
