use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Worker and video concurrency caps are not 0
/// - Archive part size is not 0
/// - Thumbnail variants are present and uniquely named
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;

    if pipeline.fallback_image_workers == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.fallback_image_workers cannot be 0".to_string(),
        ));
    }
    if pipeline.video_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.video_concurrency cannot be 0".to_string(),
        ));
    }
    if pipeline.thumbnails.is_empty() {
        return Err(ConfigError::ValidationError(
            "pipeline.thumbnails cannot be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for variant in &pipeline.thumbnails {
        if variant.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.thumbnails entries need a name".to_string(),
            ));
        }
        if variant.max_width == 0 {
            return Err(ConfigError::ValidationError(format!(
                "thumbnail variant '{}' has max_width 0",
                variant.name
            )));
        }
        if !seen.insert(variant.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate thumbnail variant '{}'",
                variant.name
            )));
        }
    }

    if config.organizer.thumbnail_variants.is_empty() {
        return Err(ConfigError::ValidationError(
            "organizer.thumbnail_variants cannot be empty".to_string(),
        ));
    }

    if config.packer.max_part_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "packer.max_part_bytes cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ThumbnailVariant;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_video_concurrency_fails() {
        let mut config = Config::default();
        config.pipeline.video_concurrency = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_part_size_fails() {
        let mut config = Config::default();
        config.packer.max_part_bytes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_variant_fails() {
        let mut config = Config::default();
        config.pipeline.thumbnails = vec![
            ThumbnailVariant::new("gallery", 1600),
            ThumbnailVariant::new("gallery", 800),
        ];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate thumbnail variant"));
    }

    #[test]
    fn test_validate_empty_variants_fails() {
        let mut config = Config::default();
        config.pipeline.thumbnails.clear();
        assert!(validate_config(&config).is_err());
    }
}
