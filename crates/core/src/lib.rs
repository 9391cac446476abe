pub mod config;
pub mod converter;
pub mod metrics;
pub mod organizer;
pub mod packer;
pub mod processor;
pub mod resources;
pub mod runner;
pub mod stop;
pub mod testing;
pub mod walker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ENV_PREFIX,
};
pub use converter::{
    AggressivityProfile, Converter, ConverterConfig, ConverterError, CropOutcome,
    FfmpegConverter, ImageJob, ThumbnailJob, ThumbnailVariant, VideoProfile,
};
pub use organizer::{
    CsvMapping, DocumentFolder, DocumentReorganizer, OrganizeProgress, OrganizeSummary,
    OrganizerConfig, OrganizerError, Record, SkippedRecord,
};
pub use packer::{
    ArchiveBuilder, ArchiveEntry, ArchivePacker, PackSource, PackSummary, PackedPart, PackerConfig,
    PackerError, ZipArchiveBuilder,
};
pub use processor::{
    AssetPipeline, FileError, FolderStatus, FolderTask, PipelineConfig, PipelineError,
    ProgressEvent, RunOptions, RunStats, RunSummary,
};
pub use resources::{Availability, ResourceProbe, SysinfoProbe, SystemProbe, TaskClass};
pub use runner::{BoundedTaskRunner, TaskError};
pub use stop::StopFlag;
pub use walker::{TreeWalker, WalkReport, WalkedDir, WalkerConfig};
