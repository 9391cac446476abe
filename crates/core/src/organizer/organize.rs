//! Regrouping of derivatives into per-document folders.

use rslug::slugify;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::processor::THUMBNAILS_DIR;
use crate::stop::StopFlag;

use super::config::OrganizerConfig;
use super::error::OrganizerError;
use super::fields::{resolve_section, LanguageGroups, ROUTING_FIELDS};
use super::index::{find_in_folder, resolve_origin_folder, AssetIndex};
use super::mapping::CsvMapping;
use super::tabular::{read_table, Record};
use super::types::{DocumentFolder, OrganizeProgress, OrganizeSummary, SkipReason, SkippedRecord};

/// Folder receiving primary assets and metadata.
pub const ORGANIZED_DIR: &str = "organized";
/// Folder receiving thumbnail variants.
pub const ORGANIZED_THUMBNAILS_DIR: &str = "organized_thumbnails";
pub const METADATA_FILE: &str = "metadata.json";

/// Lowercase ASCII hyphenated form of a group label.
pub fn slug(label: &str) -> String {
    slugify!(label.trim())
}

/// Routing values of one record.
struct RecordKeys {
    group: String,
    identifier: String,
}

/// Reads group and identifier, falling back to the first language
/// variant when the group column itself is absent.
fn record_keys(
    record: &Record,
    mapping: &CsvMapping,
    languages: &LanguageGroups,
) -> Result<RecordKeys, SkipReason> {
    let group_column = mapping.group_by_column();
    let group = match record.non_blank(group_column) {
        Some(value) => value.to_string(),
        None if !record.has_column(group_column) => languages
            .first_value(group_column)
            .map(str::to_string)
            .ok_or(SkipReason::MissingGroup)?,
        None => return Err(SkipReason::MissingGroup),
    };

    let identifier = record
        .non_blank(mapping.identifier_column())
        .map(str::to_string)
        .ok_or(SkipReason::MissingIdentifier)?;

    Ok(RecordKeys { group, identifier })
}

async fn copy_into(src: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(src, dest).await?;
    Ok(())
}

/// Rebuilds a derivative tree into slugged document folders.
pub struct DocumentReorganizer {
    config: OrganizerConfig,
    stop: StopFlag,
    progress: Option<mpsc::Sender<OrganizeProgress>>,
}

impl DocumentReorganizer {
    pub fn new(config: OrganizerConfig) -> Self {
        Self {
            config,
            stop: StopFlag::new(),
            progress: None,
        }
    }

    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Sends one event per record. Events are dropped when the channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<OrganizeProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    fn emit(&self, progress: OrganizeProgress) {
        if let Some(ref tx) = self.progress {
            let _ = tx.try_send(progress);
        }
    }

    /// Reorganizes `asset_root` according to the table at `table_path`.
    ///
    /// Output goes to `<output_root>/organized` and
    /// `<output_root>/organized_thumbnails`.
    pub async fn organize(
        &self,
        table_path: &Path,
        asset_root: &Path,
        output_root: &Path,
        mapping: &CsvMapping,
        max_records: Option<usize>,
    ) -> Result<OrganizeSummary, OrganizerError> {
        mapping.validate()?;

        if !fs::try_exists(table_path).await.unwrap_or(false) {
            return Err(OrganizerError::TableNotFound(table_path.to_path_buf()));
        }
        let is_dir = fs::metadata(asset_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(OrganizerError::AssetRootNotFound(asset_root.to_path_buf()));
        }

        let index = {
            let root = asset_root.to_path_buf();
            let extension = self.config.derivative_extension.clone();
            let excluded = self.config.excluded_names.clone();
            tokio::task::spawn_blocking(move || AssetIndex::build(&root, &extension, &excluded))
                .await
                .map_err(|e| OrganizerError::Internal(e.to_string()))?
        };

        let mut records = {
            let path = table_path.to_path_buf();
            tokio::task::spawn_blocking(move || read_table(&path))
                .await
                .map_err(|e| OrganizerError::Internal(e.to_string()))??
        };
        if let Some(max) = max_records {
            records.truncate(max);
        }

        info!(
            table = %table_path.display(),
            records = records.len(),
            assets = index.len(),
            "Starting reorganization"
        );

        let organized_root = output_root.join(ORGANIZED_DIR);
        let thumbs_root = output_root.join(ORGANIZED_THUMBNAILS_DIR);
        let total = records.len();
        let mut folders: BTreeMap<String, DocumentFolder> = BTreeMap::new();
        let mut summary = OrganizeSummary {
            total_records: total,
            ..OrganizeSummary::default()
        };

        for (i, record) in records.iter().enumerate() {
            if self.stop.is_stopped() {
                info!("Stop requested, ending reorganization early");
                summary.stopped = true;
                break;
            }

            let row = if record.row() > 0 { record.row() } else { i + 1 };
            let outcome = self
                .organize_record(record, mapping, &index, asset_root, &organized_root, &thumbs_root, &mut folders)
                .await;

            let (identifier, destination) = match outcome {
                Ok(placed) => {
                    summary.processed += 1;
                    summary.missing_thumbnails += placed.missing_thumbnails;
                    metrics::RECORDS_ORGANIZED.with_label_values(&["organized"]).inc();
                    (placed.identifier, Some(placed.destination))
                }
                Err((identifier, reason)) => {
                    warn!(row, identifier = ?identifier, reason = ?reason, "Skipping record");
                    metrics::RECORDS_ORGANIZED.with_label_values(&["skipped"]).inc();
                    summary.skipped.push(SkippedRecord {
                        row,
                        identifier: identifier.clone(),
                        reason,
                    });
                    (identifier.unwrap_or_default(), None)
                }
            };

            self.emit(OrganizeProgress {
                current: i + 1,
                total,
                identifier,
                destination,
            });
        }

        for (slug, folder) in &folders {
            let path = organized_root.join(slug).join(METADATA_FILE);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, serde_json::to_vec_pretty(folder)?).await?;
            debug!(path = %path.display(), images = folder.images.len(), "Metadata written");
            summary.folders.push(slug.clone());
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped.len(),
            folders = summary.folders.len(),
            "Reorganization finished"
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn organize_record(
        &self,
        record: &Record,
        mapping: &CsvMapping,
        index: &AssetIndex,
        asset_root: &Path,
        organized_root: &Path,
        thumbs_root: &Path,
        folders: &mut BTreeMap<String, DocumentFolder>,
    ) -> Result<PlacedRecord, (Option<String>, SkipReason)> {
        let languages = LanguageGroups::from_record(record);
        let keys = record_keys(record, mapping, &languages).map_err(|reason| {
            let identifier = record
                .non_blank(mapping.identifier_column())
                .map(str::to_string);
            (identifier, reason)
        })?;
        let skip = |reason| (Some(keys.identifier.clone()), reason);

        let slug = slug(&keys.group);
        if slug.is_empty() {
            return Err(skip(SkipReason::EmptySlug));
        }

        let extension = &self.config.derivative_extension;
        let origin = mapping
            .origin_folder_column()
            .and_then(|column| record.non_blank(column));

        let asset = match origin {
            Some(origin) => {
                let excluded = &self.config.excluded_names;
                let folder = resolve_origin_folder(asset_root, origin, excluded).ok_or_else(|| {
                    skip(SkipReason::OriginFolderNotFound {
                        origin_folder: origin.to_string(),
                    })
                })?;
                find_in_folder(&folder, &keys.identifier, extension, excluded)
                    .ok_or_else(|| skip(SkipReason::AssetNotFound))?
            }
            None => index
                .get(&keys.identifier)
                .map(Path::to_path_buf)
                .ok_or_else(|| skip(SkipReason::AssetNotFound))?,
        };

        let base = format!("{}_{}", slug, keys.identifier);
        let destination = organized_root
            .join(&slug)
            .join(format!("{}.{}", base, extension));
        copy_into(&asset, &destination).await.map_err(|e| {
            skip(SkipReason::CopyFailed {
                message: e.to_string(),
            })
        })?;

        let missing_thumbnails = self
            .copy_thumbnails(&asset, asset_root, &thumbs_root.join(&slug), &base)
            .await;

        let folder = folders.entry(slug).or_default();
        if folder.images.is_empty() {
            folder.document = resolve_section(&mapping.document, record, &languages, ROUTING_FIELDS);
        }
        folder.add_image(
            &keys.identifier,
            resolve_section(&mapping.image, record, &languages, &[]),
        );

        Ok(PlacedRecord {
            identifier: keys.identifier,
            destination,
            missing_thumbnails,
        })
    }

    /// Copies configured variants of `asset`; returns how many were missing.
    async fn copy_thumbnails(&self, asset: &Path, asset_root: &Path, dest_dir: &Path, base: &str) -> usize {
        let stem = asset
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative = asset
            .parent()
            .and_then(|p| p.strip_prefix(asset_root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let source_dir = asset_root.join(THUMBNAILS_DIR).join(relative);
        let extension = &self.config.derivative_extension;

        let mut missing = 0;
        for variant in &self.config.thumbnail_variants {
            let source = source_dir.join(format!("{}_{}.{}", stem, variant, extension));
            let dest = dest_dir.join(format!("{}_{}.{}", base, variant, extension));
            if !fs::try_exists(&source).await.unwrap_or(false) {
                warn!(path = %source.display(), "Thumbnail missing");
                missing += 1;
                continue;
            }
            if let Err(e) = copy_into(&source, &dest).await {
                warn!(path = %source.display(), error = %e, "Thumbnail copy failed");
                missing += 1;
            }
        }
        missing
    }
}

/// A record whose primary asset was placed.
struct PlacedRecord {
    identifier: String,
    destination: PathBuf,
    missing_thumbnails: usize,
}
