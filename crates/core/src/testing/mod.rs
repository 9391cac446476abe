//! Testing utilities and fake implementations of the external seams.
//!
//! This module provides stand-ins for the converter subprocesses and the
//! archive writer, so pipeline, organizer and packer runs can be exercised
//! without ffmpeg, crop scripts or real compression.
//!
//! # Example
//!
//! ```rust,ignore
//! use leggio_core::testing::{fixtures, FakeArchiveBuilder, MockConverter};
//!
//! fixtures::write_file(&input.join("Doc/1_1_1.jpg"), 2 * 1024 * 1024);
//!
//! let converter = MockConverter::new();
//! converter.fail_inputs_containing("1_1_2").await;
//!
//! let packer = ArchivePacker::new(FakeArchiveBuilder::new());
//! ```

mod fake_archive_builder;
mod mock_converter;

pub use fake_archive_builder::FakeArchiveBuilder;
pub use mock_converter::{MockConverter, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    /// Writes `len` bytes to `path`, creating parent directories.
    pub fn write_file(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture directory");
        }
        std::fs::write(path, vec![b'x'; len]).expect("write fixture file");
    }

    /// Writes a CSV file from a header line and rows.
    pub fn write_csv(path: &Path, header: &str, rows: &[&str]) {
        let mut body = String::from(header);
        body.push('\n');
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture directory");
        }
        std::fs::write(path, body).expect("write fixture csv");
    }

    /// Relative paths of every file under `root`, sorted, slash separated.
    pub fn list_files(root: &Path) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path().strip_prefix(root).ok().map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
            })
            .collect();
        files.sort();
        files
    }
}
