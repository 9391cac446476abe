//! Processor module for the asset pipeline.
//!
//! This module provides the `AssetPipeline` which walks an input tree and,
//! per folder (subfolders first):
//! - Converts images to compressed derivatives, with optional crop and
//!   thumbnail variants
//! - Copies XML sidecars
//! - Copies or transcodes videos, falling back to a plain copy on failure
//!
//! Image batches run through a `BoundedTaskRunner` sized by the
//! `ResourceProbe`; per-file failures are aggregated into `error_files.txt`.
//!
//! # Example
//!
//! ```ignore
//! use leggio_core::converter::FfmpegConverter;
//! use leggio_core::processor::{AssetPipeline, PipelineConfig, RunOptions};
//!
//! let pipeline = AssetPipeline::new(PipelineConfig::default(), FfmpegConverter::with_defaults());
//!
//! let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(100);
//! let pipeline = pipeline.with_progress(progress_tx);
//!
//! let summary = pipeline.run(input, output, RunOptions::default()).await?;
//! println!("Converted {} images", summary.converted);
//! ```

mod config;
mod pipeline;
mod types;

pub use config::PipelineConfig;
pub use pipeline::{already_done, AssetPipeline, PipelineError, ERROR_LOG_NAME, THUMBNAILS_DIR};
pub use types::{
    FileError, FileProgress, FolderStatus, FolderTask, ImageOutcome, ProgressEvent, RunOptions,
    RunStats, RunSummary, VideoOutcome,
};
