//! Converter module for producing web-ready media.
//!
//! This module provides the `Converter` trait and an FFmpeg-backed
//! implementation. All codec work happens in external processes:
//!
//! - Image derivatives (WebP, long edge capped) via ffmpeg or a configured
//!   external converter
//! - Crop of book scans via an external helper script
//! - Thumbnail variants via ffmpeg
//! - Video transcoding to a fixed web profile and still-frame extraction
//!
//! # Example
//!
//! ```ignore
//! use leggio_core::converter::{AggressivityProfile, Converter, FfmpegConverter, ImageJob};
//!
//! let converter = FfmpegConverter::with_defaults();
//! let profile = AggressivityProfile::Standard;
//! let job = ImageJob {
//!     input_path: PathBuf::from("scans/1_1_1.jpg"),
//!     output_path: PathBuf::from("out/1_1_1.webp"),
//!     aggressivity: profile,
//!     quality: profile.image_quality(2 * 1024 * 1024),
//!     max_long_edge: 3840,
//! };
//! converter.convert_image(&job).await?;
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::{ConverterConfig, VideoProfile};
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use traits::Converter;
pub use types::{AggressivityProfile, CropOutcome, ImageJob, ThumbnailJob, ThumbnailVariant};
