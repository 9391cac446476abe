//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the FFmpeg-based converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// External image converter invoked as `<cmd> <input> <output> <aggressivity>`.
    ///
    /// When unset, derivatives are encoded with ffmpeg's WebP encoder.
    #[serde(default)]
    pub image_command: Option<PathBuf>,

    /// Crop helper program.
    #[serde(default = "default_crop_program")]
    pub crop_program: PathBuf,

    /// Arguments placed before `<input> <output>` when invoking the crop helper.
    #[serde(default = "default_crop_args")]
    pub crop_args: Vec<String>,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Web profile for video transcoding.
    #[serde(default)]
    pub video: VideoProfile,
}

/// Fixed web profile used when optimizing videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProfile {
    #[serde(default = "default_video_codec")]
    pub codec: String,
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
    /// Offset of the frame extracted for video thumbnails, in seconds.
    #[serde(default = "default_frame_offset")]
    pub frame_offset_secs: f64,
    /// Container extension of transcoded videos.
    #[serde(default = "default_video_extension")]
    pub extension: String,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_crop_program() -> PathBuf {
    PathBuf::from("python3")
}

fn default_crop_args() -> Vec<String> {
    vec!["scripts/crop.py".to_string()]
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_crf() -> u8 {
    28
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

fn default_audio_bitrate() -> u32 {
    128
}

fn default_frame_offset() -> f64 {
    1.0
}

fn default_video_extension() -> String {
    "mp4".to_string()
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            crf: default_crf(),
            preset: default_preset(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            audio_bitrate_kbps: default_audio_bitrate(),
            frame_offset_secs: default_frame_offset(),
            extension: default_video_extension(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            image_command: None,
            crop_program: default_crop_program(),
            crop_args: default_crop_args(),
            ffmpeg_log_level: default_log_level(),
            video: VideoProfile::default(),
        }
    }
}

impl ConverterConfig {
    /// Sets the ffmpeg binary path.
    pub fn with_ffmpeg_path(mut self, path: PathBuf) -> Self {
        self.ffmpeg_path = path;
        self
    }

    /// Uses an external program for image derivatives.
    pub fn with_image_command(mut self, command: PathBuf) -> Self {
        self.image_command = Some(command);
        self
    }

    /// Sets the crop helper invocation.
    pub fn with_crop_command(mut self, program: PathBuf, args: Vec<String>) -> Self {
        self.crop_program = program;
        self.crop_args = args;
        self
    }

    /// Sets the video web profile.
    pub fn with_video_profile(mut self, video: VideoProfile) -> Self {
        self.video = video;
        self
    }
}
