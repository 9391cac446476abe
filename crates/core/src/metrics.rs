//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Asset pipeline (images, videos, conversion time)
//! - Reorganizer (records placed or skipped)
//! - Packer (parts written, trial builds)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Images handled by outcome.
pub static IMAGES_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leggio_images_processed_total", "Total images handled"),
        &["result"], // "converted", "skipped", "failed"
    )
    .unwrap()
});

/// Videos handled by outcome.
pub static VIDEOS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leggio_videos_processed_total", "Total videos handled"),
        &["result"], // "copied", "transcoded", "fallback", "skipped"
    )
    .unwrap()
});

/// Conversion subprocess duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "leggio_conversion_duration_seconds",
            "Duration of image and video conversions",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 1800.0]),
        &["kind"], // "image", "video"
    )
    .unwrap()
});

// =============================================================================
// Organizer Metrics
// =============================================================================

/// Metadata records by outcome.
pub static RECORDS_ORGANIZED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leggio_records_total", "Total metadata records handled"),
        &["result"], // "organized", "skipped"
    )
    .unwrap()
});

// =============================================================================
// Packer Metrics
// =============================================================================

/// Archive parts kept.
pub static ARCHIVE_PARTS_BUILT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("leggio_archive_parts_total", "Total archive parts written").unwrap()
});

/// Archives built while searching for part boundaries.
pub static TRIAL_ARCHIVES_BUILT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "leggio_trial_archives_total",
        "Total archives built to measure compressed size",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Pipeline
        Box::new(IMAGES_PROCESSED.clone()),
        Box::new(VIDEOS_PROCESSED.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        // Organizer
        Box::new(RECORDS_ORGANIZED.clone()),
        // Packer
        Box::new(ARCHIVE_PARTS_BUILT.clone()),
        Box::new(TRIAL_ARCHIVES_BUILT.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        IMAGES_PROCESSED.with_label_values(&["converted"]).inc();
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"leggio_images_processed_total".to_string()));
    }
}
