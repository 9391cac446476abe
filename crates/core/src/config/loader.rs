use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides, e.g. `LEGGIO_PACKER__MAX_PART_BYTES`.
pub const ENV_PREFIX: &str = "LEGGIO_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_empty() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.packer.max_part_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.pipeline.video_concurrency, 2);
        assert_eq!(config.organizer.derivative_extension, "webp");
    }

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[pipeline]
fallback_image_workers = 6
excluded_names = ["thumbnails", "scratch"]

[[pipeline.thumbnails]]
name = "tiny"
max_width = 64

[packer]
max_part_bytes = 1048576
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.pipeline.fallback_image_workers, 6);
        assert_eq!(config.pipeline.excluded_names, vec!["thumbnails", "scratch"]);
        assert_eq!(config.pipeline.thumbnails.len(), 1);
        assert!(!config.pipeline.thumbnails[0].crop_only);
        assert_eq!(config.packer.max_part_bytes, 1_048_576);
        assert_eq!(config.packer.compression_level, 9);
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[packer]
max_part_bytes = "big"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/leggio.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[converter]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[organizer]
thumbnail_variants = ["gallery"]
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.converter.ffmpeg_path.to_string_lossy(),
            "/opt/ffmpeg/bin/ffmpeg"
        );
        assert_eq!(config.organizer.thumbnail_variants, vec!["gallery"]);
    }
}
