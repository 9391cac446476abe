//! Types for the processor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::converter::AggressivityProfile;

/// Lifecycle of one folder within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStatus {
    Pending,
    Processing,
    Completed,
}

/// One directory discovered by the walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderTask {
    pub path: PathBuf,
    /// Display name (final path component, or the root's name).
    pub name: String,
    /// Path relative to the input root.
    pub relative: PathBuf,
    /// True for the input root when it holds images itself.
    pub is_main_folder: bool,
    pub status: FolderStatus,
    /// Images directly inside this folder.
    pub item_count: usize,
    pub items_done: usize,
}

/// Per-run switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Crop each derivative and build crop-only thumbnails.
    #[serde(default)]
    pub crop: bool,
    /// Transcode videos instead of copying them.
    #[serde(default)]
    pub optimize_video: bool,
    /// Process a small fixed sample; skips XML and video handling.
    #[serde(default)]
    pub preview_mode: bool,
    #[serde(default)]
    pub aggressivity: AggressivityProfile,
}

/// Counters shared by the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Images discovered under the whole tree (capped in preview mode).
    pub total_images: usize,
    /// Images finished so far (converted, skipped or failed).
    pub processed_images: usize,
    /// Images reserved for processing in preview mode.
    pub preview_taken: usize,
}

/// A per-file failure recorded without stopping the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

impl FileError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Line written to the run's error log.
    pub fn log_line(&self) -> String {
        format!("{} - {}", self.path.display(), self.message)
    }
}

/// What happened to one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    /// A derivative already existed.
    Skipped,
    /// The derivative was produced; `warnings` crop/thumbnail steps failed.
    Converted { warnings: usize },
}

/// What happened to one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOutcome {
    Skipped,
    Copied,
    Transcoded,
    /// Transcoding failed and the original was copied instead.
    FellBack,
}

/// Progress updates emitted while a run is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The folder registry has been built.
    FoldersInit {
        folders_status: Vec<FolderTask>,
        total_folders: usize,
        total_images: usize,
    },
    /// An image in a subfolder finished.
    FileProgress(FileProgress),
    /// An image in the input root finished.
    MainFolderProgress(FileProgress),
    /// Video handling for a folder started.
    VideoProcessing {
        current_folder: String,
        total: usize,
    },
    /// Video handling for a folder finished.
    VideoProcessingDone {
        current_folder: String,
        processed: usize,
        failed: usize,
    },
}

/// Body of per-file progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProgress {
    pub folders_status: Vec<FolderTask>,
    /// Images processed across the run.
    pub current: usize,
    pub total: usize,
    /// Index of the current folder in the registry.
    pub folder_idx: usize,
    pub folder_total: usize,
    pub current_folder: String,
    pub current_file: String,
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub folders: Vec<FolderTask>,
    pub stats: RunStats,
    pub converted: usize,
    pub skipped: usize,
    pub errors: Vec<FileError>,
    /// Written only when `errors` is non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<PathBuf>,
    /// True when a stop request cut the run short.
    pub stopped: bool,
}
