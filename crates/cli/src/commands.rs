//! Subcommand handlers.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use leggio_core::{
    ArchivePacker, AssetPipeline, Config, CsvMapping, DocumentReorganizer, FfmpegConverter,
    OrganizeProgress, OrganizeSummary, PackSource, PackSummary, ProgressEvent, ResourceProbe,
    RunOptions, RunSummary, StopFlag, ZipArchiveBuilder,
};

use crate::cli::{ConvertArgs, ConvertOptions, OrganizeArgs, PackArgs, RunArgs};

/// Buffer size for progress channels
const PROGRESS_BUFFER_SIZE: usize = 256;

impl From<&ConvertOptions> for RunOptions {
    fn from(options: &ConvertOptions) -> Self {
        Self {
            crop: options.crop,
            optimize_video: options.optimize_video,
            preview_mode: options.preview,
            aggressivity: options.aggressivity.into(),
        }
    }
}

pub async fn convert(config: &Config, args: &ConvertArgs, stop: &StopFlag) -> Result<()> {
    let summary = run_pipeline(config, &args.input, &args.output, &args.options, stop).await?;
    print_json(&summary)
}

pub async fn organize(config: &Config, args: &OrganizeArgs, stop: &StopFlag) -> Result<()> {
    let summary = run_organizer(
        config,
        &args.table,
        &args.assets,
        &args.output,
        &args.mapping,
        args.max_records,
        stop,
    )
    .await?;
    print_json(&summary)
}

pub async fn pack(config: &Config, args: &PackArgs, stop: &StopFlag) -> Result<()> {
    let max_part_bytes = args.max_part_bytes.unwrap_or(config.packer.max_part_bytes);
    let packed = run_packer(config, &args.root, &args.archive, max_part_bytes, stop).await?;
    print_json(&packed)
}

/// Converts, then organizes the converted tree, then packs the result.
pub async fn run_all(config: &Config, args: &RunArgs, stop: &StopFlag) -> Result<()> {
    let converted =
        run_pipeline(config, &args.input, &args.output, &args.options, stop).await?;
    if converted.stopped || stop.is_stopped() {
        bail!("Stopped during conversion");
    }

    let organized = run_organizer(
        config,
        &args.table,
        &args.output,
        &args.output,
        &args.mapping,
        args.max_records,
        stop,
    )
    .await?;
    if organized.stopped || stop.is_stopped() {
        bail!("Stopped during organization");
    }

    let archive = args
        .archive
        .clone()
        .unwrap_or_else(|| default_archive_path(&args.input, &args.output));
    let max_part_bytes = args.max_part_bytes.unwrap_or(config.packer.max_part_bytes);
    let packed = run_packer(config, &args.output, &archive, max_part_bytes, stop).await?;
    if packed.stopped {
        bail!("Stopped during packing after {} part(s)", packed.parts.len());
    }

    print_json(&serde_json::json!({
        "convert": converted,
        "organize": organized,
        "pack": packed.parts,
    }))
}

async fn run_pipeline(
    config: &Config,
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    stop: &StopFlag,
) -> Result<RunSummary> {
    let converter = FfmpegConverter::new(config.converter.clone());
    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER_SIZE);
    let reporter = tokio::spawn(log_pipeline_progress(rx));

    let pipeline = AssetPipeline::new(config.pipeline.clone(), converter)
        .with_resource_probe(Arc::new(ResourceProbe::system()))
        .with_stop(stop.clone())
        .with_progress(tx);

    info!(input = %input.display(), output = %output.display(), "Starting conversion");
    let result = pipeline.run(input, output, RunOptions::from(options)).await;
    drop(pipeline);
    let _ = reporter.await;

    let summary = result.context("Conversion failed")?;
    if let Some(ref log) = summary.error_log {
        warn!(
            errors = summary.errors.len(),
            log = %log.display(),
            "Conversion finished with errors"
        );
    }
    info!(
        converted = summary.converted,
        skipped = summary.skipped,
        errors = summary.errors.len(),
        "Conversion complete"
    );
    Ok(summary)
}

async fn run_organizer(
    config: &Config,
    table: &Path,
    assets: &Path,
    output: &Path,
    mapping_path: &Path,
    max_records: Option<usize>,
    stop: &StopFlag,
) -> Result<OrganizeSummary> {
    let mapping = CsvMapping::load(mapping_path)
        .await
        .with_context(|| format!("Failed to load mapping from {:?}", mapping_path))?;

    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER_SIZE);
    let reporter = tokio::spawn(log_organize_progress(rx));

    let reorganizer = DocumentReorganizer::new(config.organizer.clone())
        .with_stop(stop.clone())
        .with_progress(tx);

    info!(table = %table.display(), assets = %assets.display(), "Starting reorganization");
    let result = reorganizer
        .organize(table, assets, output, &mapping, max_records)
        .await;
    drop(reorganizer);
    let _ = reporter.await;

    let summary = result.context("Reorganization failed")?;
    info!(
        processed = summary.processed,
        skipped = summary.skipped.len(),
        folders = summary.folders.len(),
        "Reorganization complete"
    );
    Ok(summary)
}

async fn run_packer(
    config: &Config,
    root: &Path,
    archive: &Path,
    max_part_bytes: u64,
    stop: &StopFlag,
) -> Result<PackSummary> {
    let sources = PackSource::organized_layout(root, &config.packer.thumbnails_root);
    let packer = ArchivePacker::new(ZipArchiveBuilder::new(config.packer.compression_level))
        .with_stop(stop.clone());

    let packed = packer
        .pack(&sources, archive, max_part_bytes)
        .await
        .with_context(|| format!("Failed to pack {:?}", root))?;

    for part in &packed.parts {
        info!(
            path = %part.path.display(),
            size = part.size_bytes,
            entries = part.entries,
            oversize = part.oversize,
            "Archive part"
        );
    }
    if packed.stopped {
        warn!(parts = packed.parts.len(), "Packing stopped before completion");
    }
    Ok(packed)
}

/// `<output>/<input name>.zip`
fn default_archive_path(input: &Path, output: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "archive".to_string());
    output.join(format!("{}.zip", name))
}

async fn log_pipeline_progress(mut rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::FoldersInit {
                total_folders,
                total_images,
                ..
            } => info!(total_folders, total_images, "Folders registered"),
            ProgressEvent::FileProgress(p) | ProgressEvent::MainFolderProgress(p) => debug!(
                current = p.current,
                total = p.total,
                folder = %p.current_folder,
                file = %p.current_file,
                "Image done"
            ),
            ProgressEvent::VideoProcessing {
                current_folder,
                total,
            } => info!(folder = %current_folder, total, "Processing videos"),
            ProgressEvent::VideoProcessingDone {
                current_folder,
                processed,
                failed,
            } => info!(folder = %current_folder, processed, failed, "Videos done"),
        }
    }
}

async fn log_organize_progress(mut rx: mpsc::Receiver<OrganizeProgress>) {
    while let Some(progress) = rx.recv().await {
        debug!(
            current = progress.current,
            total = progress.total,
            identifier = %progress.identifier,
            destination = ?progress.destination,
            "Record done"
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode summary")?;
    println!("{}", text);
    Ok(())
}
