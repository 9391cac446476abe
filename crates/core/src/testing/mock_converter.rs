//! Mock converter for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::converter::{Converter, ConverterError, CropOutcome, ImageJob, ThumbnailJob};

/// A recorded converter call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    ConvertImage {
        input: PathBuf,
        output: PathBuf,
        quality: u8,
    },
    Crop {
        input: PathBuf,
        output: PathBuf,
    },
    Thumbnail {
        input: PathBuf,
        output: PathBuf,
        max_width: u32,
    },
    ValidateVideo,
    TranscodeVideo {
        input: PathBuf,
        output: PathBuf,
    },
    ExtractFrame {
        input: PathBuf,
        output: PathBuf,
    },
}

/// Mock implementation of the Converter trait.
///
/// Writes a small placeholder file for every output it is asked to
/// produce, so the filesystem looks like a real run. Clones share state.
///
/// # Example
///
/// ```rust,ignore
/// use leggio_core::testing::MockConverter;
///
/// let converter = MockConverter::new();
/// converter.fail_inputs_containing("broken").await;
///
/// let pipeline = AssetPipeline::new(PipelineConfig::default(), converter.clone());
/// pipeline.run(input, output, RunOptions::default()).await?;
///
/// assert_eq!(converter.convert_count().await, 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// Number of upcoming image conversions that fail.
    failing_converts: Arc<RwLock<usize>>,
    /// Image inputs whose file name contains one of these always fail.
    failing_inputs: Arc<RwLock<Vec<String>>>,
    /// `None` makes every crop fail.
    crop_outcome: Arc<RwLock<Option<CropOutcome>>>,
    fail_thumbnails: Arc<RwLock<bool>>,
    video_available: Arc<RwLock<bool>>,
    fail_transcodes: Arc<RwLock<bool>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a mock where every operation succeeds.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            failing_converts: Arc::new(RwLock::new(0)),
            failing_inputs: Arc::new(RwLock::new(Vec::new())),
            crop_outcome: Arc::new(RwLock::new(Some(CropOutcome::Cropped))),
            fail_thumbnails: Arc::new(RwLock::new(false)),
            video_available: Arc::new(RwLock::new(true)),
            fail_transcodes: Arc::new(RwLock::new(false)),
        }
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of image conversion attempts, including retries.
    pub async fn convert_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::ConvertImage { .. }))
            .await
    }

    pub async fn thumbnail_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::Thumbnail { .. }))
            .await
    }

    pub async fn transcode_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::TranscodeVideo { .. }))
            .await
    }

    async fn count(&self, pred: impl Fn(&RecordedCall) -> bool) -> usize {
        self.calls.read().await.iter().filter(|c| pred(c)).count()
    }

    /// Fail the next `n` image conversions.
    pub async fn fail_next_converts(&self, n: usize) {
        *self.failing_converts.write().await = n;
    }

    /// Always fail conversions of inputs whose name contains `fragment`.
    pub async fn fail_inputs_containing(&self, fragment: impl Into<String>) {
        self.failing_inputs.write().await.push(fragment.into());
    }

    /// Set the outcome of every crop; `None` makes crops fail.
    pub async fn set_crop_outcome(&self, outcome: Option<CropOutcome>) {
        *self.crop_outcome.write().await = outcome;
    }

    pub async fn fail_thumbnails(&self, fail: bool) {
        *self.fail_thumbnails.write().await = fail;
    }

    /// Controls the result of the transcoder availability check.
    pub async fn set_video_available(&self, available: bool) {
        *self.video_available.write().await = available;
    }

    pub async fn fail_transcodes(&self, fail: bool) {
        *self.fail_transcodes.write().await = fail;
    }

    async fn record(&self, call: RecordedCall) {
        self.calls.write().await.push(call);
    }

    async fn should_fail_convert(&self, input: &Path) -> bool {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self
            .failing_inputs
            .read()
            .await
            .iter()
            .any(|f| name.contains(f.as_str()))
        {
            return true;
        }

        let mut remaining = self.failing_converts.write().await;
        if *remaining > 0 {
            *remaining -= 1;
            return true;
        }
        false
    }

    async fn write_placeholder(path: &Path) -> Result<(), ConverterError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, b"mock output").await?;
        Ok(())
    }

    fn mock_failure(what: &str) -> ConverterError {
        ConverterError::conversion_failed(
            format!("mock {} failure", what),
            Some("simulated stderr".to_string()),
        )
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn convert_image(&self, job: &ImageJob) -> Result<(), ConverterError> {
        self.record(RecordedCall::ConvertImage {
            input: job.input_path.clone(),
            output: job.output_path.clone(),
            quality: job.quality,
        })
        .await;

        if self.should_fail_convert(&job.input_path).await {
            return Err(Self::mock_failure("convert"));
        }
        Self::write_placeholder(&job.output_path).await
    }

    async fn crop_image(&self, input: &Path, output: &Path) -> Result<CropOutcome, ConverterError> {
        self.record(RecordedCall::Crop {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        })
        .await;

        match *self.crop_outcome.read().await {
            Some(CropOutcome::Cropped) => {
                Self::write_placeholder(output).await?;
                Ok(CropOutcome::Cropped)
            }
            Some(CropOutcome::NotNeeded) => Ok(CropOutcome::NotNeeded),
            None => Err(ConverterError::CropFailed {
                code: Some(1),
                stderr: Some("simulated stderr".to_string()),
            }),
        }
    }

    async fn make_thumbnail(&self, job: &ThumbnailJob) -> Result<(), ConverterError> {
        self.record(RecordedCall::Thumbnail {
            input: job.input_path.clone(),
            output: job.output_path.clone(),
            max_width: job.max_width,
        })
        .await;

        if *self.fail_thumbnails.read().await {
            return Err(Self::mock_failure("thumbnail"));
        }
        Self::write_placeholder(&job.output_path).await
    }

    async fn validate_video(&self) -> Result<(), ConverterError> {
        self.record(RecordedCall::ValidateVideo).await;
        if *self.video_available.read().await {
            Ok(())
        } else {
            Err(ConverterError::FfmpegNotFound {
                path: PathBuf::from("ffmpeg"),
            })
        }
    }

    async fn transcode_video(&self, input: &Path, output: &Path) -> Result<(), ConverterError> {
        self.record(RecordedCall::TranscodeVideo {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        })
        .await;

        if *self.fail_transcodes.read().await {
            return Err(Self::mock_failure("transcode"));
        }
        Self::write_placeholder(output).await
    }

    async fn extract_frame(&self, input: &Path, output: &Path) -> Result<(), ConverterError> {
        self.record(RecordedCall::ExtractFrame {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        })
        .await;
        Self::write_placeholder(output).await
    }
}
