use serde::{Deserialize, Serialize};

use crate::converter::ConverterConfig;
use crate::organizer::OrganizerConfig;
use crate::packer::PackerConfig;
use crate::processor::PipelineConfig;

/// Root configuration
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub organizer: OrganizerConfig,
    #[serde(default)]
    pub packer: PackerConfig,
}
