//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lowest quality a derivative is ever encoded at.
const MIN_IMAGE_QUALITY: i64 = 40;
/// Highest quality a derivative is ever encoded at.
const MAX_IMAGE_QUALITY: i64 = 95;
const MIN_THUMBNAIL_QUALITY: i64 = 30;
const MAX_THUMBNAIL_QUALITY: i64 = 90;

/// Named quality policy trading visual fidelity for output size.
///
/// Selected once per run and threaded through every conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggressivityProfile {
    /// Favors fidelity.
    Low,
    /// Balanced default.
    #[default]
    Standard,
    /// Favors small files.
    High,
}

impl AggressivityProfile {
    /// Returns the name passed to external converters.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Standard => "standard",
            Self::High => "high",
        }
    }

    /// Quality baseline before the size penalty is applied.
    pub fn baseline(&self) -> f64 {
        match self {
            Self::Low => 92.0,
            Self::Standard => 85.0,
            Self::High => 75.0,
        }
    }

    /// Megabytes of input per quality point lost.
    pub fn divisor(&self) -> f64 {
        match self {
            Self::Low => 20.0,
            Self::Standard => 10.0,
            Self::High => 5.0,
        }
    }

    /// Offset applied to the derivative quality for thumbnails.
    pub fn thumbnail_offset(&self) -> i64 {
        match self {
            Self::Low => -5,
            Self::Standard => -10,
            Self::High => -15,
        }
    }

    /// Derivative quality for a source of `size_bytes`.
    pub fn image_quality(&self, size_bytes: u64) -> u8 {
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        let quality = (self.baseline() - size_mb / self.divisor()).round() as i64;
        quality.clamp(MIN_IMAGE_QUALITY, MAX_IMAGE_QUALITY) as u8
    }

    /// Thumbnail quality for a source of `size_bytes`.
    pub fn thumbnail_quality(&self, size_bytes: u64) -> u8 {
        let quality = self.image_quality(size_bytes) as i64 + self.thumbnail_offset();
        quality.clamp(MIN_THUMBNAIL_QUALITY, MAX_THUMBNAIL_QUALITY) as u8
    }
}

impl fmt::Display for AggressivityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggressivityProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "standard" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            other => Err(format!("unknown aggressivity profile: {}", other)),
        }
    }
}

/// A named thumbnail size produced for every asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailVariant {
    /// Alias used as the file name suffix (`<basename>_<name>.webp`).
    pub name: String,
    /// Maximum output width in pixels.
    pub max_width: u32,
    /// Generated only from the cropped working copy when cropping is on.
    #[serde(default)]
    pub crop_only: bool,
}

impl ThumbnailVariant {
    pub fn new(name: impl Into<String>, max_width: u32) -> Self {
        Self {
            name: name.into(),
            max_width,
            crop_only: false,
        }
    }

    pub fn crop_only(mut self) -> Self {
        self.crop_only = true;
        self
    }
}

/// Image to derivative conversion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub aggressivity: AggressivityProfile,
    /// Encoder quality (0-100).
    pub quality: u8,
    /// Long edge cap in pixels; smaller images are never upscaled.
    pub max_long_edge: u32,
}

/// Thumbnail generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub max_width: u32,
    pub quality: u8,
}

/// Result of the external crop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    /// A cropped copy was written.
    Cropped,
    /// The image needs no crop; no output was written.
    NotNeeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_quality_decreases_with_size() {
        let profile = AggressivityProfile::Standard;
        assert_eq!(profile.image_quality(0), 85);
        assert_eq!(profile.image_quality(20 * MB), 83);
        assert!(profile.image_quality(200 * MB) < profile.image_quality(2 * MB));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(AggressivityProfile::High.image_quality(10_000 * MB), 40);
        assert_eq!(AggressivityProfile::Low.image_quality(0), 92);
        assert_eq!(AggressivityProfile::High.thumbnail_quality(10_000 * MB), 30);
    }

    #[test]
    fn test_profiles_are_ordered() {
        let size = 12 * MB;
        assert!(
            AggressivityProfile::Low.image_quality(size)
                > AggressivityProfile::Standard.image_quality(size)
        );
        assert!(
            AggressivityProfile::Standard.image_quality(size)
                > AggressivityProfile::High.image_quality(size)
        );
    }

    #[test]
    fn test_thumbnail_offset() {
        assert_eq!(AggressivityProfile::Standard.thumbnail_quality(0), 75);
        assert_eq!(AggressivityProfile::Low.thumbnail_quality(0), 87);
    }

    #[test]
    fn test_parse_profile() {
        assert_eq!("HIGH".parse::<AggressivityProfile>(), Ok(AggressivityProfile::High));
        assert_eq!(" low ".parse::<AggressivityProfile>(), Ok(AggressivityProfile::Low));
        assert!("extreme".parse::<AggressivityProfile>().is_err());
    }

    #[test]
    fn test_profile_serde() {
        let json = serde_json::to_string(&AggressivityProfile::High).unwrap();
        assert_eq!(json, "\"high\"");
    }
}
