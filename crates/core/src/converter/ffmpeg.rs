//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{CropOutcome, ImageJob, ThumbnailJob};

/// Exit code of the crop helper meaning "nothing to crop".
const CROP_NOT_NEEDED_EXIT: i32 = 2;

/// Keep at most this many bytes of stderr in error values.
const STDERR_TAIL_BYTES: usize = 2048;

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Builds ffmpeg arguments for a WebP derivative.
    fn build_image_args(&self, job: &ImageJob) -> Vec<String> {
        let edge = job.max_long_edge;
        vec![
            "-y".to_string(),
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
            "-vf".to_string(),
            // Cap the long edge, never upscale
            format!(
                "scale='if(gt(iw,ih),min({edge},iw),-1)':'if(gt(iw,ih),-1,min({edge},ih))'"
            ),
            "-frames:v".to_string(),
            "1".to_string(),
            "-c:v".to_string(),
            "libwebp".to_string(),
            "-quality".to_string(),
            job.quality.to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            job.output_path.to_string_lossy().to_string(),
        ]
    }

    /// Builds ffmpeg arguments for a thumbnail.
    fn build_thumbnail_args(&self, job: &ThumbnailJob) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("scale='min({},iw)':-1", job.max_width),
            "-frames:v".to_string(),
            "1".to_string(),
            "-c:v".to_string(),
            "libwebp".to_string(),
            "-quality".to_string(),
            job.quality.to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            job.output_path.to_string_lossy().to_string(),
        ]
    }

    /// Builds ffmpeg arguments for video transcoding.
    fn build_video_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        let profile = &self.config.video;
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-c:v".to_string(),
            profile.codec.clone(),
            "-crf".to_string(),
            profile.crf.to_string(),
            "-preset".to_string(),
            profile.preset.clone(),
            // Scale while maintaining aspect ratio, only if larger than max
            "-vf".to_string(),
            format!(
                "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
                profile.max_width, profile.max_height
            ),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", profile.audio_bitrate_kbps),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            output_path.to_string_lossy().to_string(),
        ]
    }

    /// Builds ffmpeg arguments for still-frame extraction.
    fn build_frame_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{:.3}", self.config.video.frame_offset_secs),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            output_path.to_string_lossy().to_string(),
        ]
    }

    fn build_crop_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.config.crop_args.iter().map(OsString::from).collect();
        args.push(input.as_os_str().to_owned());
        args.push(output.as_os_str().to_owned());
        args
    }

    async fn ensure_parent(path: &Path) -> Result<(), ConverterError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                ConverterError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }
        Ok(())
    }

    async fn ensure_input(path: &Path) -> Result<(), ConverterError> {
        if tokio::fs::metadata(path).await.is_err() {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Verifies the tool left a non-empty file behind.
    async fn verify_output(path: &Path) -> Result<(), ConverterError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(ConverterError::EmptyOutput {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Runs a program to completion and returns its exit status and stderr.
    async fn run_tool<I, S>(
        &self,
        program: &Path,
        args: I,
    ) -> Result<(std::process::ExitStatus, String), ConverterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    if program == self.config.ffmpeg_path.as_path() {
                        ConverterError::FfmpegNotFound {
                            path: program.to_path_buf(),
                        }
                    } else {
                        ConverterError::ToolNotFound {
                            path: program.to_path_buf(),
                        }
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        Ok((output.status, stderr_tail(&output.stderr)))
    }

    /// Runs ffmpeg and fails unless it exits cleanly and writes `output`.
    async fn run_ffmpeg(&self, args: Vec<String>, output: &Path) -> Result<(), ConverterError> {
        debug!(args = ?args, "Running ffmpeg");
        let ffmpeg = self.config.ffmpeg_path.clone();
        let (status, stderr) = self.run_tool(&ffmpeg, &args).await?;
        if !status.success() {
            return Err(ConverterError::conversion_failed(
                format!("FFmpeg exited with code: {:?}", status.code()),
                non_empty(stderr),
            ));
        }
        Self::verify_output(output).await
    }

    async fn run_image_command(
        &self,
        command: &Path,
        job: &ImageJob,
    ) -> Result<(), ConverterError> {
        let args: [&std::ffi::OsStr; 3] = [
            job.input_path.as_os_str(),
            job.output_path.as_os_str(),
            std::ffi::OsStr::new(job.aggressivity.name()),
        ];
        let (status, stderr) = self.run_tool(command, args).await?;
        if !status.success() {
            return Err(ConverterError::conversion_failed(
                format!("Image converter exited with code: {:?}", status.code()),
                non_empty(stderr),
            ));
        }
        Self::verify_output(&job.output_path).await
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn video_extension(&self) -> &str {
        &self.config.video.extension
    }

    async fn convert_image(&self, job: &ImageJob) -> Result<(), ConverterError> {
        Self::ensure_input(&job.input_path).await?;
        Self::ensure_parent(&job.output_path).await?;

        match &self.config.image_command {
            Some(command) => self.run_image_command(command, job).await,
            None => {
                let args = self.build_image_args(job);
                self.run_ffmpeg(args, &job.output_path).await
            }
        }
    }

    async fn crop_image(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<CropOutcome, ConverterError> {
        Self::ensure_input(input).await?;
        Self::ensure_parent(output).await?;

        let program = self.config.crop_program.clone();
        let (status, stderr) = self
            .run_tool(&program, self.build_crop_args(input, output))
            .await?;

        match status.code() {
            Some(0) => {
                Self::verify_output(output).await?;
                Ok(CropOutcome::Cropped)
            }
            Some(CROP_NOT_NEEDED_EXIT) => Ok(CropOutcome::NotNeeded),
            code => Err(ConverterError::CropFailed {
                code,
                stderr: non_empty(stderr),
            }),
        }
    }

    async fn make_thumbnail(&self, job: &ThumbnailJob) -> Result<(), ConverterError> {
        Self::ensure_input(&job.input_path).await?;
        Self::ensure_parent(&job.output_path).await?;
        let args = self.build_thumbnail_args(job);
        self.run_ffmpeg(args, &job.output_path).await
    }

    async fn validate_video(&self) -> Result<(), ConverterError> {
        let ffmpeg = self.config.ffmpeg_path.clone();
        let (status, stderr) = self.run_tool(&ffmpeg, ["-version"]).await?;
        if !status.success() {
            return Err(ConverterError::conversion_failed(
                "ffmpeg -version failed",
                non_empty(stderr),
            ));
        }
        Ok(())
    }

    async fn transcode_video(&self, input: &Path, output: &Path) -> Result<(), ConverterError> {
        Self::ensure_input(input).await?;
        Self::ensure_parent(output).await?;
        let args = self.build_video_args(input, output);
        self.run_ffmpeg(args, output).await
    }

    async fn extract_frame(&self, input: &Path, output: &Path) -> Result<(), ConverterError> {
        Self::ensure_input(input).await?;
        Self::ensure_parent(output).await?;
        let args = self.build_frame_args(input, output);
        self.run_ffmpeg(args, output).await
    }
}
