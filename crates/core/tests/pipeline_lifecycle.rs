//! Asset pipeline integration tests.
//!
//! These tests drive the pipeline end to end over a temp tree with the
//! mock converter:
//! - Output layout for derivatives and thumbnails
//! - Idempotent re-runs
//! - Excluded folders
//! - Error log aggregation

use std::path::Path;

use tempfile::TempDir;

use leggio_core::{
    processor::{FolderStatus, ERROR_LOG_NAME},
    testing::{fixtures, MockConverter},
    AssetPipeline, PipelineConfig, RunOptions,
};

/// Test helper owning the input and output trees.
struct TestHarness {
    pipeline: AssetPipeline<MockConverter>,
    converter: MockConverter,
    input: TempDir,
    output: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let converter = MockConverter::new();
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter.clone());
        Self {
            pipeline,
            converter,
            input: TempDir::new().expect("Failed to create input dir"),
            output: TempDir::new().expect("Failed to create output dir"),
        }
    }

    fn add(&self, relative: &str, len: usize) {
        fixtures::write_file(&self.input.path().join(relative), len);
    }

    fn output(&self) -> &Path {
        self.output.path()
    }

    async fn run(&self, options: RunOptions) -> leggio_core::RunSummary {
        self.pipeline
            .run(self.input.path(), self.output.path(), options)
            .await
            .expect("Pipeline run failed")
    }
}

#[tokio::test]
async fn test_single_image_layout_without_crop() {
    let harness = TestHarness::new();
    harness.add("Doc/1_1_1.jpg", 2 * 1024 * 1024);

    let summary = harness.run(RunOptions::default()).await;

    assert_eq!(summary.converted, 1);
    assert!(summary.errors.is_empty());
    assert!(summary.error_log.is_none());
    assert_eq!(
        fixtures::list_files(harness.output()),
        vec![
            "Doc/1_1_1.webp",
            "thumbnails/Doc/1_1_1_gallery.webp",
            "thumbnails/Doc/1_1_1_low_quality.webp",
        ]
    );
    assert!(!harness.output().join(ERROR_LOG_NAME).exists());
}

#[tokio::test]
async fn test_crop_adds_book_variant() {
    let harness = TestHarness::new();
    harness.add("Doc/1_1_1.jpg", 1024);

    let options = RunOptions {
        crop: true,
        ..RunOptions::default()
    };
    harness.run(options).await;

    let files = fixtures::list_files(harness.output());
    assert!(files.contains(&"thumbnails/Doc/1_1_1_book.webp".to_string()));
    assert!(!files.iter().any(|f| f.contains("_cropped")));
}

#[tokio::test]
async fn test_second_run_converts_nothing() {
    let harness = TestHarness::new();
    harness.add("A/1.jpg", 100);
    harness.add("A/B/2.png", 100);
    harness.add("3.tif", 100);

    let first = harness.run(RunOptions::default()).await;
    assert_eq!(first.converted, 3);
    let converts = harness.converter.convert_count().await;
    let thumbnails = harness.converter.thumbnail_count().await;

    let second = harness.run(RunOptions::default()).await;
    assert_eq!(second.converted, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(harness.converter.convert_count().await, converts);
    assert_eq!(harness.converter.thumbnail_count().await, thumbnails);
}

#[tokio::test]
async fn test_excluded_folders_are_ignored() {
    let harness = TestHarness::new();
    harness.add("Doc/1.jpg", 100);
    harness.add("Doc/Thumbnails/old.jpg", 100);
    harness.add("organized/fondo/2.jpg", 100);

    let summary = harness.run(RunOptions::default()).await;

    assert_eq!(summary.converted, 1);
    assert_eq!(summary.folders.len(), 1);
    assert_eq!(summary.folders[0].name, "Doc");
    assert_eq!(summary.folders[0].status, FolderStatus::Completed);
    assert!(!harness.output().join("Doc/Thumbnails").exists());
}

#[tokio::test]
async fn test_failures_land_in_error_log() {
    let harness = TestHarness::new();
    harness.add("Doc/good.jpg", 100);
    harness.add("Doc/broken.jpg", 100);
    harness.converter.fail_inputs_containing("broken").await;

    let summary = harness.run(RunOptions::default()).await;

    assert_eq!(summary.converted, 1);
    assert_eq!(summary.errors.len(), 1);
    let log_path = summary.error_log.expect("error log should be written");
    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("broken.jpg - "));
    assert!(!log.contains("good.jpg"));
    assert!(harness.output().join("Doc/good.webp").exists());
    assert!(!harness.output().join("Doc/broken.webp").exists());
}

#[tokio::test]
async fn test_videos_and_xml_are_copied() {
    let harness = TestHarness::new();
    harness.add("Doc/1.jpg", 100);
    harness.add("Doc/clip.mov", 300);
    harness.add("Doc/mag.xml", 50);

    harness.run(RunOptions::default()).await;

    let files = fixtures::list_files(harness.output());
    assert!(files.contains(&"Doc/clip.mov".to_string()));
    assert!(files.contains(&"Doc/mag.xml".to_string()));
    assert_eq!(harness.converter.transcode_count().await, 0);
}
