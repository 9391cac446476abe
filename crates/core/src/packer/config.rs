//! Configuration for the packer module.

use serde::{Deserialize, Serialize};

const GIB: u64 = 1024 * 1024 * 1024;

/// Configuration for archive packing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackerConfig {
    /// Size ceiling of every non-oversize part, in bytes.
    #[serde(default = "default_max_part_bytes")]
    pub max_part_bytes: u64,

    /// Deflate level (0-9).
    #[serde(default = "default_compression_level")]
    pub compression_level: i64,

    /// Archive folder receiving the thumbnail tree.
    #[serde(default = "default_thumbnails_root")]
    pub thumbnails_root: String,
}

fn default_max_part_bytes() -> u64 {
    2 * GIB
}

fn default_compression_level() -> i64 {
    9
}

fn default_thumbnails_root() -> String {
    "thumbnails".to_string()
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            max_part_bytes: default_max_part_bytes(),
            compression_level: default_compression_level(),
            thumbnails_root: default_thumbnails_root(),
        }
    }
}

impl PackerConfig {
    pub fn with_max_part_bytes(mut self, bytes: u64) -> Self {
        self.max_part_bytes = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PackerConfig::default();
        assert_eq!(config.max_part_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.compression_level, 9);
        assert_eq!(config.thumbnails_root, "thumbnails");
    }
}
