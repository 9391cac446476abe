//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use leggio_core::AggressivityProfile;

/// Scan ingestion: web derivatives, catalog reorganization and split archives
#[derive(Parser, Debug)]
#[command(name = "leggio", version, about)]
pub struct Cli {
    /// Configuration file (defaults to $LEGGIO_CONFIG, then leggio.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Write metrics in Prometheus text format to FILE when done
    #[arg(long, global = true, value_name = "FILE")]
    pub metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a scan tree into derivatives and thumbnails
    Convert(ConvertArgs),
    /// Regroup converted assets into per-document folders
    Organize(OrganizeArgs),
    /// Pack a reorganized output root into size-bounded zip parts
    Pack(PackArgs),
    /// Convert, organize and pack in one go
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConvertOptions {
    /// Crop derivatives and build crop-only thumbnails
    #[arg(long)]
    pub crop: bool,

    /// Transcode videos instead of copying them
    #[arg(long)]
    pub optimize_video: bool,

    /// Only process a small sample of images
    #[arg(long)]
    pub preview: bool,

    #[arg(long, value_enum, default_value_t = Aggressivity::Standard)]
    pub aggressivity: Aggressivity,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    #[command(flatten)]
    pub options: ConvertOptions,
}

#[derive(Args, Debug)]
pub struct OrganizeArgs {
    /// Metadata table (.csv, .xlsx, .xls, .ods)
    #[arg(value_name = "TABLE")]
    pub table: PathBuf,

    /// Converted asset root
    #[arg(value_name = "ASSETS")]
    pub assets: PathBuf,

    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// JSON mapping from output fields to table columns
    #[arg(long, value_name = "FILE")]
    pub mapping: PathBuf,

    /// Only handle the first N records
    #[arg(long, value_name = "N")]
    pub max_records: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Output root holding organized/ and organized_thumbnails/
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Archive path; parts are numbered next to it
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Overrides packer.max_part_bytes
    #[arg(long, value_name = "BYTES")]
    pub max_part_bytes: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output root for derivatives and organized folders
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    #[arg(long, value_name = "FILE")]
    pub table: PathBuf,

    #[arg(long, value_name = "FILE")]
    pub mapping: PathBuf,

    /// Archive path; defaults to <OUTPUT>/<name>.zip
    #[arg(long, value_name = "ARCHIVE")]
    pub archive: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub max_records: Option<usize>,

    #[arg(long, value_name = "BYTES")]
    pub max_part_bytes: Option<u64>,

    #[command(flatten)]
    pub options: ConvertOptions,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggressivity {
    Low,
    Standard,
    High,
}

impl From<Aggressivity> for AggressivityProfile {
    fn from(value: Aggressivity) -> Self {
        match value {
            Aggressivity::Low => AggressivityProfile::Low,
            Aggressivity::Standard => AggressivityProfile::Standard,
            Aggressivity::High => AggressivityProfile::High,
        }
    }
}
