//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// An external helper program (image converter, crop script) not found.
    #[error("External tool not found: {path}")]
    ToolNotFound { path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// Conversion process failed.
    #[error("Conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The crop helper exited with an unexpected status.
    #[error("Crop failed with exit code {code:?}")]
    CropFailed {
        code: Option<i32>,
        stderr: Option<String>,
    },

    /// The tool reported success but left no usable output.
    #[error("Output file missing or empty: {path}")]
    EmptyOutput { path: PathBuf },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a new conversion failed error with stderr output.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Captured stderr of the failing tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ConversionFailed { stderr, .. } | Self::CropFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }

    /// Whether the failure means a required tool is missing.
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, Self::FfmpegNotFound { .. } | Self::ToolNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_accessor() {
        let err = ConverterError::conversion_failed("boom", Some("bad input".to_string()));
        assert_eq!(err.stderr(), Some("bad input"));
        assert_eq!(err.to_string(), "Conversion failed: boom");

        let err = ConverterError::EmptyOutput {
            path: PathBuf::from("/tmp/x.webp"),
        };
        assert!(err.stderr().is_none());
    }

    #[test]
    fn test_tool_missing() {
        assert!(ConverterError::FfmpegNotFound {
            path: PathBuf::from("ffmpeg")
        }
        .is_tool_missing());
        assert!(!ConverterError::CropFailed {
            code: Some(1),
            stderr: None
        }
        .is_tool_missing());
    }
}
