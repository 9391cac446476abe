//! Asset pipeline implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::fs;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use crate::converter::{
    Converter, ConverterError, CropOutcome, ImageJob, ThumbnailJob, ThumbnailVariant,
};
use crate::metrics;
use crate::resources::{ResourceProbe, TaskClass};
use crate::runner::{BoundedTaskRunner, TaskError};
use crate::stop::StopFlag;
use crate::walker::{TreeWalker, WalkedDir};

use super::config::PipelineConfig;
use super::types::{
    FileError, FileProgress, FolderStatus, FolderTask, ImageOutcome, ProgressEvent, RunOptions,
    RunStats, RunSummary, VideoOutcome,
};

/// Directory under the output root holding thumbnail variants.
pub const THUMBNAILS_DIR: &str = "thumbnails";
/// Per-run failure list written to the output root.
pub const ERROR_LOG_NAME: &str = "error_files.txt";
/// Upper bound on concurrent video tasks.
const MAX_VIDEO_CONCURRENCY: usize = 2;
/// Extension of the transient still frame used for video thumbnails.
const FRAME_EXTENSION: &str = "jpg";

/// Error type for pipeline operations.
///
/// Only run-level failures surface here; per-file problems end up in
/// [`RunSummary::errors`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input root is missing or not a directory.
    #[error("Input directory not found: {0}")]
    InputNotFound(PathBuf),

    /// Video optimization was requested but the transcoder cannot run.
    #[error("Video transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    /// The resource probe refused the run.
    #[error("Insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking scan task failed to complete.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Returns true when `target` holds a finished derivative.
///
/// A zero-byte file is a leftover of an interrupted run; it is removed so
/// the caller regenerates it.
pub async fn already_done(target: &Path) -> bool {
    match fs::metadata(target).await {
        Ok(meta) if meta.len() > 0 => true,
        Ok(_) => {
            debug!(path = %target.display(), "Removing empty derivative");
            let _ = fs::remove_file(target).await;
            false
        }
        Err(_) => false,
    }
}

/// Kind of file the pipeline handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Image,
    Video,
    Xml,
}

/// Files found directly inside one walked directory.
#[derive(Debug, Clone)]
struct FolderInventory {
    dir: WalkedDir,
    registry_idx: Option<usize>,
    images: Vec<PathBuf>,
    videos: Vec<PathBuf>,
    xml: Vec<PathBuf>,
}

fn classify(config: &PipelineConfig, path: &Path) -> Option<FileKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let matches = |list: &[String]| list.iter().any(|e| e.eq_ignore_ascii_case(&ext));
    if matches(&config.image_extensions) {
        Some(FileKind::Image)
    } else if matches(&config.video_extensions) {
        Some(FileKind::Video)
    } else if matches(&config.xml_extensions) {
        Some(FileKind::Xml)
    } else {
        None
    }
}

/// Walks `root` and lists the files of every directory found.
fn scan_tree(config: &PipelineConfig, root: &Path) -> Vec<FolderInventory> {
    let report = TreeWalker::new(config.walker_config()).walk(root);

    report
        .dirs
        .into_iter()
        .map(|dir| {
            let mut inventory = FolderInventory {
                dir,
                registry_idx: None,
                images: Vec::new(),
                videos: Vec::new(),
                xml: Vec::new(),
            };

            let entries = match std::fs::read_dir(&inventory.dir.path) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %inventory.dir.path.display(), error = %e, "Cannot list directory");
                    return inventory;
                }
            };

            let mut files: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
                .map(|e| e.path())
                .collect();
            files.sort();

            for file in files {
                match classify(config, &file) {
                    Some(FileKind::Image) => inventory.images.push(file),
                    Some(FileKind::Video) => inventory.videos.push(file),
                    Some(FileKind::Xml) => inventory.xml.push(file),
                    None => {}
                }
            }
            inventory
        })
        .collect()
}

/// Orders folders so every subdirectory comes before its parent.
///
/// Siblings keep the walk's enumeration order.
fn processing_order(folders: &[FolderInventory]) -> Vec<usize> {
    if folders.is_empty() {
        return Vec::new();
    }

    let index: HashMap<&Path, usize> = folders
        .iter()
        .enumerate()
        .map(|(i, f)| (f.dir.relative.as_path(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); folders.len()];
    for (i, folder) in folders.iter().enumerate().skip(1) {
        let parent = folder
            .dir
            .relative
            .parent()
            .and_then(|p| index.get(p).copied())
            .unwrap_or(0);
        children[parent].push(i);
    }

    let mut order = Vec::with_capacity(folders.len());
    let mut stack = vec![(0usize, false)];
    while let Some((idx, expanded)) = stack.pop() {
        if expanded {
            order.push(idx);
            continue;
        }
        stack.push((idx, true));
        for &child in children[idx].iter().rev() {
            stack.push((child, false));
        }
    }
    order
}

fn display_name(dir: &WalkedDir) -> String {
    dir.path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.path.display().to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared by every task of one run.
struct RunContext<C> {
    converter: Arc<C>,
    config: PipelineConfig,
    options: RunOptions,
    output_root: PathBuf,
    folders: Mutex<Vec<FolderTask>>,
    errors: Mutex<Vec<FileError>>,
    stats: Mutex<RunStats>,
    converted: AtomicUsize,
    skipped: AtomicUsize,
    transcoder: OnceCell<Result<(), String>>,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl<C: Converter> RunContext<C> {
    fn emit(&self, event: ProgressEvent) {
        if let Some(ref tx) = self.progress {
            if tx.try_send(event).is_err() {
                debug!("Progress channel full or closed, dropping event");
            }
        }
    }

    fn record_error(&self, error: FileError) {
        warn!(path = %error.path.display(), message = %error.message, "File failed");
        lock(&self.errors).push(error);
    }

    fn set_status(&self, idx: Option<usize>, status: FolderStatus) {
        if let Some(idx) = idx {
            if let Some(folder) = lock(&self.folders).get_mut(idx) {
                folder.status = status;
            }
        }
    }

    fn folders_snapshot(&self) -> Vec<FolderTask> {
        lock(&self.folders).clone()
    }

    /// Reserves up to `wanted` images from the preview quota.
    fn reserve_preview(&self, wanted: usize) -> usize {
        let mut stats = lock(&self.stats);
        let room = self
            .config
            .preview_sample_size
            .saturating_sub(stats.preview_taken);
        let taken = wanted.min(room);
        stats.preview_taken += taken;
        taken
    }

    fn preview_exhausted(&self) -> bool {
        self.options.preview_mode
            && lock(&self.stats).preview_taken >= self.config.preview_sample_size
    }

    /// Marks one image of folder `idx` finished and reports progress.
    fn file_done(&self, idx: Option<usize>, folder_name: &str, file: &str) {
        let (current, total) = {
            let mut stats = lock(&self.stats);
            stats.processed_images += 1;
            (stats.processed_images, stats.total_images)
        };

        let (folders_status, is_main) = {
            let mut folders = lock(&self.folders);
            let mut is_main = false;
            if let Some(folder) = idx.and_then(|i| folders.get_mut(i)) {
                folder.items_done += 1;
                is_main = folder.is_main_folder;
            }
            (folders.clone(), is_main)
        };

        let folder_total = folders_status.len();
        let body = FileProgress {
            folders_status,
            current,
            total,
            folder_idx: idx.unwrap_or(0),
            folder_total,
            current_folder: folder_name.to_string(),
            current_file: file.to_string(),
        };

        self.emit(if is_main {
            ProgressEvent::MainFolderProgress(body)
        } else {
            ProgressEvent::FileProgress(body)
        });
    }

    fn derivative_path(&self, relative: &Path, stem: &str) -> PathBuf {
        self.output_root
            .join(relative)
            .join(format!("{}.{}", stem, self.config.derivative_extension))
    }

    fn thumbnail_path(&self, relative: &Path, stem: &str, variant: &str) -> PathBuf {
        self.output_root
            .join(THUMBNAILS_DIR)
            .join(relative)
            .join(format!("{}_{}.{}", stem, variant, self.config.derivative_extension))
    }

    async fn convert_with_retry(&self, job: &ImageJob) -> Result<(), ConverterError> {
        let start = Instant::now();
        let result = match self.converter.convert_image(job).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    input = %job.input_path.display(),
                    error = %e,
                    "Conversion failed, retrying once"
                );
                let _ = fs::remove_file(&job.output_path).await;
                self.converter.convert_image(job).await
            }
        };
        metrics::CONVERSION_DURATION
            .with_label_values(&["image"])
            .observe(start.elapsed().as_secs_f64());
        result
    }

    /// Builds one thumbnail per variant from `source`, returning the failures.
    async fn thumbnails<'a>(
        &self,
        source: &Path,
        relative: &Path,
        stem: &str,
        quality: u8,
        variants: impl Iterator<Item = &'a ThumbnailVariant>,
    ) -> Vec<(String, ConverterError)> {
        let mut failures = Vec::new();
        for variant in variants {
            let job = ThumbnailJob {
                input_path: source.to_path_buf(),
                output_path: self.thumbnail_path(relative, stem, &variant.name),
                max_width: variant.max_width,
                quality,
            };
            if let Err(e) = self.converter.make_thumbnail(&job).await {
                failures.push((variant.name.clone(), e));
            }
        }
        failures
    }

    async fn process_image(&self, src: &Path, relative: &Path) -> Result<ImageOutcome, FileError> {
        let stem = file_stem(src);
        let target = self.derivative_path(relative, &stem);

        if already_done(&target).await {
            debug!(path = %target.display(), "Derivative exists, skipping");
            return Ok(ImageOutcome::Skipped);
        }

        let size = fs::metadata(src).await.map(|m| m.len()).unwrap_or(0);
        let profile = self.options.aggressivity;
        let job = ImageJob {
            input_path: src.to_path_buf(),
            output_path: target.clone(),
            aggressivity: profile,
            quality: profile.image_quality(size),
            max_long_edge: self.config.max_long_edge,
        };

        self.convert_with_retry(&job)
            .await
            .map_err(|e| FileError::new(src, format!("Conversion failed: {}", e)))?;

        let thumb_quality = profile.thumbnail_quality(size);
        let mut warnings = 0;

        if self.options.crop {
            let cropped = target.with_file_name(format!(
                "{}_cropped.{}",
                stem, self.config.derivative_extension
            ));
            match self.converter.crop_image(&target, &cropped).await {
                Ok(outcome) => {
                    let source = match outcome {
                        CropOutcome::Cropped => cropped.as_path(),
                        CropOutcome::NotNeeded => target.as_path(),
                    };
                    let failures = self
                        .thumbnails(source, relative, &stem, thumb_quality, self.config.crop_thumbnails())
                        .await;
                    for (variant, e) in failures {
                        warnings += 1;
                        self.record_error(FileError::new(
                            src,
                            format!("Thumbnail '{}' failed: {}", variant, e),
                        ));
                    }
                    if outcome == CropOutcome::Cropped {
                        let _ = fs::remove_file(&cropped).await;
                    }
                }
                Err(e) => {
                    warnings += 1;
                    let _ = fs::remove_file(&cropped).await;
                    self.record_error(FileError::new(src, format!("Crop failed: {}", e)));
                }
            }
        }

        let failures = self
            .thumbnails(&target, relative, &stem, thumb_quality, self.config.standard_thumbnails())
            .await;
        for (variant, e) in failures {
            warnings += 1;
            self.record_error(FileError::new(
                src,
                format!("Thumbnail '{}' failed: {}", variant, e),
            ));
        }

        Ok(ImageOutcome::Converted { warnings })
    }

    /// Checks the transcoder once per run.
    async fn ensure_transcoder(&self) -> Result<(), PipelineError> {
        let converter = Arc::clone(&self.converter);
        self.transcoder
            .get_or_init(|| async move { converter.validate_video().await.map_err(|e| e.to_string()) })
            .await
            .clone()
            .map_err(PipelineError::TranscoderUnavailable)
    }

    async fn copy_video(&self, src: &Path, dest: &Path) -> Result<VideoOutcome, FileError> {
        if let (Ok(a), Ok(b)) = (fs::metadata(src).await, fs::metadata(dest).await) {
            if a.len() == b.len() {
                return Ok(VideoOutcome::Skipped);
            }
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FileError::new(src, format!("Copy failed: {}", e)))?;
        }
        fs::copy(src, dest)
            .await
            .map_err(|e| FileError::new(src, format!("Copy failed: {}", e)))?;
        Ok(VideoOutcome::Copied)
    }

    /// Transcode, frame grab and thumbnails; returns the failing step.
    async fn optimize_video(
        &self,
        src: &Path,
        dest: &Path,
        relative: &Path,
        stem: &str,
    ) -> Result<(), (&'static str, ConverterError)> {
        let start = Instant::now();
        self.converter
            .transcode_video(src, dest)
            .await
            .map_err(|e| ("transcode", e))?;
        metrics::CONVERSION_DURATION
            .with_label_values(&["video"])
            .observe(start.elapsed().as_secs_f64());

        let frame = dest.with_file_name(format!("{}_frame.{}", stem, FRAME_EXTENSION));
        self.converter
            .extract_frame(src, &frame)
            .await
            .map_err(|e| ("extract_frame", e))?;

        let size = fs::metadata(&frame).await.map(|m| m.len()).unwrap_or(0);
        let quality = self.options.aggressivity.thumbnail_quality(size);
        let failures = self
            .thumbnails(&frame, relative, stem, quality, self.config.standard_thumbnails())
            .await;
        let _ = fs::remove_file(&frame).await;

        match failures.into_iter().next() {
            Some((_, e)) => Err(("thumbnail", e)),
            None => Ok(()),
        }
    }

    async fn write_video_error_log(
        &self,
        dir: &Path,
        stem: &str,
        src: &Path,
        step: &str,
        error: &ConverterError,
    ) {
        let log_path = dir.join(format!("{}.video_error.log", stem));
        let mut body = format!(
            "timestamp: {}\nsource: {}\nstep: {}\nerror: {}\n",
            chrono::Utc::now().to_rfc3339(),
            src.display(),
            step,
            error
        );
        if let Some(stderr) = error.stderr() {
            body.push_str("stderr:\n");
            body.push_str(stderr);
            body.push('\n');
        }
        let written = match fs::create_dir_all(dir).await {
            Ok(()) => fs::write(&log_path, body).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(path = %log_path.display(), error = %e, "Cannot write video error log");
            self.record_error(FileError::new(
                src,
                format!("Video error log not written to {}: {}", log_path.display(), e),
            ));
        }
    }

    async fn process_video(&self, src: &Path, relative: &Path) -> Result<VideoOutcome, FileError> {
        let out_dir = self.output_root.join(relative);
        let copy_dest = out_dir.join(file_name(src));

        if !self.options.optimize_video {
            return self.copy_video(src, &copy_dest).await;
        }

        let stem = file_stem(src);
        let dest = out_dir.join(format!("{}.{}", stem, self.converter.video_extension()));
        if already_done(&dest).await {
            return Ok(VideoOutcome::Skipped);
        }

        match self.optimize_video(src, &dest, relative, &stem).await {
            Ok(()) => Ok(VideoOutcome::Transcoded),
            Err((step, e)) => {
                warn!(input = %src.display(), step, error = %e, "Video optimization failed, copying original");
                self.write_video_error_log(&out_dir, &stem, src, step, &e).await;
                let _ = fs::remove_file(&dest).await;
                match self.copy_video(src, &copy_dest).await {
                    Ok(_) => Ok(VideoOutcome::FellBack),
                    Err(copy_err) => Err(FileError::new(
                        src,
                        format!("Video {} failed ({}) and fallback copy failed: {}", step, e, copy_err.message),
                    )),
                }
            }
        }
    }
}

/// Walks an input tree and produces derivatives, thumbnails and videos.
pub struct AssetPipeline<C: Converter> {
    config: PipelineConfig,
    converter: Arc<C>,
    probe: Option<Arc<ResourceProbe>>,
    stop: StopFlag,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl<C: Converter + 'static> AssetPipeline<C> {
    pub fn new(config: PipelineConfig, converter: C) -> Self {
        Self {
            config,
            converter: Arc::new(converter),
            probe: None,
            stop: StopFlag::new(),
            progress: None,
        }
    }

    /// Sizes image batches from live system state.
    pub fn with_resource_probe(mut self, probe: Arc<ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Sends progress events to `tx`. Events are dropped when the channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    fn image_workers(&self, avg_file_size_mb: Option<f64>) -> usize {
        match self.probe {
            Some(ref probe) => probe.recommend_workers(TaskClass::Image, avg_file_size_mb),
            None => self.config.fallback_image_workers.max(1),
        }
    }

    /// Processes `input_root` into `output_root`.
    pub async fn run(
        &self,
        input_root: &Path,
        output_root: &Path,
        options: RunOptions,
    ) -> Result<RunSummary, PipelineError> {
        let is_dir = fs::metadata(input_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(PipelineError::InputNotFound(input_root.to_path_buf()));
        }
        fs::create_dir_all(output_root).await?;

        let config = self.config.clone();
        let root = input_root.to_path_buf();
        let mut folders = tokio::task::spawn_blocking(move || scan_tree(&config, &root))
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        let order = processing_order(&folders);
        let mut registry = Vec::new();
        for &idx in &order {
            let folder = &mut folders[idx];
            let is_root = folder.dir.depth == 0;
            if is_root && folder.images.is_empty() {
                continue;
            }
            folder.registry_idx = Some(registry.len());
            registry.push(FolderTask {
                path: folder.dir.path.clone(),
                name: display_name(&folder.dir),
                relative: folder.dir.relative.clone(),
                is_main_folder: is_root,
                status: FolderStatus::Pending,
                item_count: folder.images.len(),
                items_done: 0,
            });
        }

        let discovered: usize = folders.iter().map(|f| f.images.len()).sum();
        let total_images = if options.preview_mode {
            discovered.min(self.config.preview_sample_size)
        } else {
            discovered
        };

        if self.config.refuse_on_low_memory {
            if let Some(ref probe) = self.probe {
                let workers = self.image_workers(None);
                let availability = probe.check_availability(TaskClass::Image, workers);
                if !availability.available {
                    return Err(PipelineError::InsufficientResources(
                        availability.reason.unwrap_or_default(),
                    ));
                }
            }
        }

        info!(
            input = %input_root.display(),
            output = %output_root.display(),
            folders = registry.len(),
            images = discovered,
            crop = options.crop,
            optimize_video = options.optimize_video,
            preview = options.preview_mode,
            aggressivity = %options.aggressivity,
            "Starting asset pipeline"
        );

        let ctx = Arc::new(RunContext {
            converter: Arc::clone(&self.converter),
            config: self.config.clone(),
            options,
            output_root: output_root.to_path_buf(),
            folders: Mutex::new(registry),
            errors: Mutex::new(Vec::new()),
            stats: Mutex::new(RunStats {
                total_images,
                ..RunStats::default()
            }),
            converted: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            transcoder: OnceCell::new(),
            progress: self.progress.clone(),
        });

        let folders_status = ctx.folders_snapshot();
        ctx.emit(ProgressEvent::FoldersInit {
            total_folders: folders_status.len(),
            folders_status,
            total_images,
        });

        let mut stopped = false;
        for idx in order {
            if self.stop.is_stopped() {
                info!("Stop requested, ending run early");
                stopped = true;
                break;
            }
            if ctx.preview_exhausted() {
                debug!("Preview sample reached");
                break;
            }
            self.process_folder(&ctx, &folders[idx]).await?;
        }
        stopped |= self.stop.is_stopped();

        let errors = lock(&ctx.errors).clone();
        let error_log = if errors.is_empty() {
            None
        } else {
            let path = output_root.join(ERROR_LOG_NAME);
            let body: Vec<String> = errors.iter().map(FileError::log_line).collect();
            fs::write(&path, body.join("\n") + "\n").await?;
            warn!(count = errors.len(), path = %path.display(), "Run finished with errors");
            Some(path)
        };

        let summary = RunSummary {
            folders: ctx.folders_snapshot(),
            stats: *lock(&ctx.stats),
            converted: ctx.converted.load(Ordering::Relaxed),
            skipped: ctx.skipped.load(Ordering::Relaxed),
            errors,
            error_log,
            stopped,
        };

        info!(
            converted = summary.converted,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            stopped,
            "Asset pipeline finished"
        );
        Ok(summary)
    }

    async fn process_folder(
        &self,
        ctx: &Arc<RunContext<C>>,
        folder: &FolderInventory,
    ) -> Result<(), PipelineError> {
        let idx = folder.registry_idx;
        let name = display_name(&folder.dir);
        let relative = folder.dir.relative.clone();
        ctx.set_status(idx, FolderStatus::Processing);
        debug!(folder = %folder.dir.path.display(), images = folder.images.len(), "Processing folder");

        let images: Vec<PathBuf> = if ctx.options.preview_mode {
            let take = ctx.reserve_preview(folder.images.len());
            folder.images.iter().take(take).cloned().collect()
        } else {
            folder.images.clone()
        };

        if !images.is_empty() {
            self.process_images(ctx, idx, &name, &relative, images).await;
        }

        if !ctx.options.preview_mode && !self.stop.is_stopped() {
            for xml in &folder.xml {
                let dest = ctx.output_root.join(&relative).join(file_name(xml));
                if let Err(e) = copy_file(xml, &dest).await {
                    ctx.record_error(FileError::new(xml, format!("Copy failed: {}", e)));
                }
            }

            if !folder.videos.is_empty() {
                self.process_videos(ctx, &name, &relative, &folder.videos)
                    .await?;
            }
        }

        ctx.set_status(idx, FolderStatus::Completed);
        Ok(())
    }

    async fn process_images(
        &self,
        ctx: &Arc<RunContext<C>>,
        idx: Option<usize>,
        folder_name: &str,
        relative: &Path,
        images: Vec<PathBuf>,
    ) {
        let mut total_bytes = 0u64;
        for image in &images {
            total_bytes += fs::metadata(image).await.map(|m| m.len()).unwrap_or(0);
        }
        let avg_mb = total_bytes as f64 / images.len() as f64 / (1024.0 * 1024.0);
        let workers = self.image_workers(Some(avg_mb));
        let runner = BoundedTaskRunner::new(workers).with_stop(self.stop.clone());

        let tasks: Vec<_> = images
            .iter()
            .cloned()
            .map(|src| {
                let ctx = Arc::clone(ctx);
                let relative = relative.to_path_buf();
                let folder_name = folder_name.to_string();
                move || async move {
                    let result = ctx.process_image(&src, &relative).await;
                    ctx.file_done(idx, &folder_name, &file_name(&src));
                    result
                }
            })
            .collect();

        let results = runner.run(tasks).await;
        for (src, result) in images.iter().zip(results) {
            match result {
                Ok(ImageOutcome::Skipped) => {
                    ctx.skipped.fetch_add(1, Ordering::Relaxed);
                    metrics::IMAGES_PROCESSED.with_label_values(&["skipped"]).inc();
                }
                Ok(ImageOutcome::Converted { .. }) => {
                    ctx.converted.fetch_add(1, Ordering::Relaxed);
                    metrics::IMAGES_PROCESSED.with_label_values(&["converted"]).inc();
                }
                Err(TaskError::Failed(error)) => {
                    metrics::IMAGES_PROCESSED.with_label_values(&["failed"]).inc();
                    ctx.record_error(error);
                }
                Err(TaskError::Panicked(message)) => {
                    metrics::IMAGES_PROCESSED.with_label_values(&["failed"]).inc();
                    ctx.record_error(FileError::new(src, format!("Task panicked: {}", message)));
                }
                Err(TaskError::Cancelled) => {}
            }
        }
    }

    async fn process_videos(
        &self,
        ctx: &Arc<RunContext<C>>,
        folder_name: &str,
        relative: &Path,
        videos: &[PathBuf],
    ) -> Result<(), PipelineError> {
        if ctx.options.optimize_video {
            ctx.ensure_transcoder().await?;
        }

        ctx.emit(ProgressEvent::VideoProcessing {
            current_folder: folder_name.to_string(),
            total: videos.len(),
        });

        let cap = self.config.video_concurrency.clamp(1, MAX_VIDEO_CONCURRENCY);
        let runner = BoundedTaskRunner::new(cap).with_stop(self.stop.clone());
        let tasks: Vec<_> = videos
            .iter()
            .cloned()
            .map(|src| {
                let ctx = Arc::clone(ctx);
                let relative = relative.to_path_buf();
                move || async move { ctx.process_video(&src, &relative).await }
            })
            .collect();

        let mut processed = 0;
        let mut failed = 0;
        for (src, result) in videos.iter().zip(runner.run(tasks).await) {
            match result {
                Ok(outcome) => {
                    processed += 1;
                    let label = match outcome {
                        VideoOutcome::Skipped => "skipped",
                        VideoOutcome::Copied => "copied",
                        VideoOutcome::Transcoded => "transcoded",
                        VideoOutcome::FellBack => "fallback",
                    };
                    metrics::VIDEOS_PROCESSED.with_label_values(&[label]).inc();
                }
                Err(TaskError::Failed(error)) => {
                    failed += 1;
                    ctx.record_error(error);
                }
                Err(TaskError::Panicked(message)) => {
                    failed += 1;
                    ctx.record_error(FileError::new(src, format!("Task panicked: {}", message)));
                }
                Err(TaskError::Cancelled) => {}
            }
        }

        ctx.emit(ProgressEvent::VideoProcessingDone {
            current_folder: folder_name.to_string(),
            processed,
            failed,
        });
        Ok(())
    }
}

async fn copy_file(src: &Path, dest: &Path) -> std::io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(src, dest).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConverter;
    use tempfile::TempDir;

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn test_already_done() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("full.webp");
        let empty = dir.path().join("empty.webp");
        write(&full, b"data");
        write(&empty, b"");

        assert!(already_done(&full).await);
        assert!(!already_done(&empty).await);
        assert!(!empty.exists());
        assert!(!already_done(&dir.path().join("missing.webp")).await);
    }

    #[test]
    fn test_processing_order_is_post_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for sub in ["a/a1", "a/a2", "b"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }

        let folders = scan_tree(&PipelineConfig::default(), root);
        let order: Vec<PathBuf> = processing_order(&folders)
            .into_iter()
            .map(|i| folders[i].dir.relative.clone())
            .collect();

        assert_eq!(
            order,
            vec![
                PathBuf::from("a/a1"),
                PathBuf::from("a/a2"),
                PathBuf::from("a"),
                PathBuf::from("b"),
                PathBuf::new(),
            ]
        );
    }

    #[test]
    fn test_scan_classifies_files() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("Doc/1.JPG"), b"img");
        write(&dir.path().join("Doc/clip.mov"), b"vid");
        write(&dir.path().join("Doc/meta.xml"), b"<x/>");
        write(&dir.path().join("Doc/notes.txt"), b"skip");
        write(&dir.path().join("Doc/.hidden.jpg"), b"skip");

        let folders = scan_tree(&PipelineConfig::default(), dir.path());
        let doc = folders.iter().find(|f| f.dir.relative == Path::new("Doc")).unwrap();
        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.videos.len(), 1);
        assert_eq!(doc.xml.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let pipeline = AssetPipeline::new(PipelineConfig::default(), MockConverter::new());
        let result = pipeline
            .run(&dir.path().join("nope"), dir.path(), RunOptions::default())
            .await;
        assert!(matches!(result, Err(PipelineError::InputNotFound(_))));
    }

    #[tokio::test]
    async fn test_convert_retried_once() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/1_1_1.jpg"), b"scan");

        let converter = MockConverter::new();
        converter.fail_next_converts(1).await;
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter.clone());
        let summary = pipeline
            .run(input.path(), output.path(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.converted, 1);
        assert!(summary.errors.is_empty());
        assert_eq!(converter.convert_count().await, 2);
        assert!(output.path().join("Doc/1_1_1.webp").exists());
    }

    #[tokio::test]
    async fn test_conversion_failure_recorded() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/bad.jpg"), b"scan");
        write(&input.path().join("Doc/good.jpg"), b"scan");

        let converter = MockConverter::new();
        converter.fail_inputs_containing("bad").await;
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter);
        let summary = pipeline
            .run(input.path(), output.path(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.errors.len(), 1);
        let log = std::fs::read_to_string(output.path().join(ERROR_LOG_NAME)).unwrap();
        assert!(log.contains("bad.jpg - Conversion failed"));
        assert!(!output.path().join("thumbnails/Doc/bad_gallery.webp").exists());
    }

    #[tokio::test]
    async fn test_crop_builds_book_variant_and_removes_working_copy() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/1_1_1.jpg"), b"scan");

        let pipeline = AssetPipeline::new(PipelineConfig::default(), MockConverter::new());
        let options = RunOptions {
            crop: true,
            ..RunOptions::default()
        };
        pipeline.run(input.path(), output.path(), options).await.unwrap();

        assert!(output.path().join("thumbnails/Doc/1_1_1_book.webp").exists());
        assert!(output.path().join("thumbnails/Doc/1_1_1_gallery.webp").exists());
        assert!(!output.path().join("Doc/1_1_1_cropped.webp").exists());
    }

    #[tokio::test]
    async fn test_thumbnail_failure_keeps_derivative() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/1_1_1.jpg"), b"scan");

        let converter = MockConverter::new();
        converter.fail_thumbnails(true).await;
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter);
        let summary = pipeline
            .run(input.path(), output.path(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.errors.len(), 2);
        assert!(output.path().join("Doc/1_1_1.webp").exists());
    }

    #[tokio::test]
    async fn test_video_copied_without_optimization() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/clip.mov"), b"video-bytes");

        let converter = MockConverter::new();
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter.clone());
        pipeline
            .run(input.path(), output.path(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(output.path().join("Doc/clip.mov")).unwrap(),
            b"video-bytes"
        );
        assert_eq!(converter.transcode_count().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_transcoder_is_fatal() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/clip.mov"), b"video-bytes");

        let converter = MockConverter::new();
        converter.set_video_available(false).await;
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter);
        let options = RunOptions {
            optimize_video: true,
            ..RunOptions::default()
        };
        let result = pipeline.run(input.path(), output.path(), options).await;
        assert!(matches!(result, Err(PipelineError::TranscoderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_video_failure_falls_back_to_copy() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/clip.mov"), b"video-bytes");

        let converter = MockConverter::new();
        converter.fail_transcodes(true).await;
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter);
        let options = RunOptions {
            optimize_video: true,
            ..RunOptions::default()
        };
        let summary = pipeline.run(input.path(), output.path(), options).await.unwrap();

        assert!(summary.errors.is_empty());
        assert!(output.path().join("Doc/clip.mov").exists());
        assert!(!output.path().join("Doc/clip.mp4").exists());
        let log = std::fs::read_to_string(output.path().join("Doc/clip.video_error.log")).unwrap();
        assert!(log.contains("step: transcode"));
    }

    #[tokio::test]
    async fn test_unwritable_video_error_log_is_reported() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/clip.mov"), b"video-bytes");
        std::fs::create_dir_all(output.path().join("Doc/clip.video_error.log")).unwrap();

        let converter = MockConverter::new();
        converter.fail_transcodes(true).await;
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter);
        let options = RunOptions {
            optimize_video: true,
            ..RunOptions::default()
        };
        let summary = pipeline.run(input.path(), output.path(), options).await.unwrap();

        assert!(output.path().join("Doc/clip.mov").exists());
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].message.contains("Video error log not written"));
    }

    #[tokio::test]
    async fn test_video_transcoded_with_thumbnails() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/clip.mov"), b"video-bytes");

        let pipeline = AssetPipeline::new(PipelineConfig::default(), MockConverter::new());
        let options = RunOptions {
            optimize_video: true,
            ..RunOptions::default()
        };
        pipeline.run(input.path(), output.path(), options).await.unwrap();

        assert!(output.path().join("Doc/clip.mp4").exists());
        assert!(output.path().join("thumbnails/Doc/clip_low_quality.webp").exists());
        assert!(!output.path().join("Doc/clip_frame.jpg").exists());
    }

    #[tokio::test]
    async fn test_preview_caps_total_work() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        for folder in ["A", "B", "C"] {
            for i in 0..3 {
                write(&input.path().join(format!("{}/{}.jpg", folder, i)), b"scan");
            }
            write(&input.path().join(format!("{}/meta.xml", folder)), b"<x/>");
        }

        let converter = MockConverter::new();
        let pipeline = AssetPipeline::new(PipelineConfig::default(), converter.clone());
        let options = RunOptions {
            preview_mode: true,
            ..RunOptions::default()
        };
        let summary = pipeline.run(input.path(), output.path(), options).await.unwrap();

        assert_eq!(summary.converted, 4);
        assert_eq!(summary.stats.total_images, 4);
        assert_eq!(converter.convert_count().await, 4);
        assert!(!output.path().join("A/meta.xml").exists());
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("Doc/1.jpg"), b"scan");

        let stop = StopFlag::new();
        stop.stop();
        let converter = MockConverter::new();
        let pipeline =
            AssetPipeline::new(PipelineConfig::default(), converter.clone()).with_stop(stop);
        let summary = pipeline
            .run(input.path(), output.path(), RunOptions::default())
            .await
            .unwrap();

        assert!(summary.stopped);
        assert_eq!(converter.convert_count().await, 0);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write(&input.path().join("root.jpg"), b"scan");
        write(&input.path().join("Doc/1.jpg"), b"scan");

        let (tx, mut rx) = mpsc::channel(64);
        let pipeline =
            AssetPipeline::new(PipelineConfig::default(), MockConverter::new()).with_progress(tx);
        pipeline
            .run(input.path(), output.path(), RunOptions::default())
            .await
            .unwrap();
        drop(pipeline);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                ProgressEvent::FoldersInit { total_folders, .. } => {
                    assert_eq!(total_folders, 2);
                    "init"
                }
                ProgressEvent::FileProgress(_) => "file",
                ProgressEvent::MainFolderProgress(p) => {
                    assert_eq!(p.current, 2);
                    "main"
                }
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["init", "file", "main"]);
    }
}
