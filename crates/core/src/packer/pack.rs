//! Size-bounded splitting of a tree into ZIP parts.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::metrics;
use crate::stop::StopFlag;

use super::builder::ArchiveBuilder;
use super::error::PackerError;
use super::types::{ArchiveEntry, PackItem, PackSource, PackSummary, PackedPart};

/// Path of part `number` next to `output`.
///
/// `out.zip` becomes `out_part1.zip`, or `out_part1_oversize.zip`.
pub fn part_path(output: &Path, number: usize, oversize: bool) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let suffix = if oversize { "_oversize" } else { "" };
    output.with_file_name(format!("{}_part{}{}.zip", stem, number, suffix))
}

fn trial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    output.with_file_name(format!(".{}.trial-{}.zip", stem, uuid::Uuid::new_v4()))
}

/// Files under `dir` as archive entries of `source`, sorted by path.
fn files_under(source: &PackSource, dir: &Path) -> Result<Vec<ArchiveEntry>, PackerError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&source.path) else {
            continue;
        };
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        entries.push(ArchiveEntry {
            source: entry.path().to_path_buf(),
            name: source.archive_name(&relative.join("/")),
        });
    }
    Ok(entries)
}

fn top_level_names(dir: &Path) -> Result<Vec<String>, PackerError> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

/// Groups the sources into items keyed by the primary's top-level entries.
///
/// A secondary subtree with the same top-level name travels with the
/// primary item; secondary entries without a counterpart become items of
/// their own after all primary items.
pub fn collect_items(sources: &[PackSource]) -> Result<Vec<PackItem>, PackerError> {
    let (primary, secondary) = sources.split_first().ok_or(PackerError::NoSources)?;
    if !primary.path.is_dir() {
        return Err(PackerError::SourceNotFound(primary.path.clone()));
    }

    let mut items = Vec::new();
    let primary_names = top_level_names(&primary.path)?;
    for name in &primary_names {
        let mut entries = files_under(primary, &primary.path.join(name))?;
        for other in secondary {
            let matching = other.path.join(name);
            if matching.exists() {
                entries.extend(files_under(other, &matching)?);
            }
        }
        if entries.is_empty() {
            debug!(item = %name, "Skipping empty item");
            continue;
        }
        items.push(PackItem {
            name: name.clone(),
            entries,
        });
    }

    for other in secondary {
        if !other.path.is_dir() {
            continue;
        }
        for name in top_level_names(&other.path)? {
            if primary_names.contains(&name) {
                continue;
            }
            let entries = files_under(other, &other.path.join(&name))?;
            if !entries.is_empty() {
                items.push(PackItem {
                    name: other.archive_name(&name),
                    entries,
                });
            }
        }
    }
    Ok(items)
}

fn entries_of(items: &[PackItem]) -> Vec<ArchiveEntry> {
    items.iter().flat_map(|i| i.entries.iter().cloned()).collect()
}

fn names_of(items: &[PackItem]) -> Vec<String> {
    items.iter().map(|i| i.name.clone()).collect()
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Cannot remove trial archive");
        }
    }
}

/// Packs source trees into one or more size-bounded archives.
pub struct ArchivePacker<B: ArchiveBuilder> {
    builder: B,
    stop: StopFlag,
}

impl<B: ArchiveBuilder> ArchivePacker<B> {
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            stop: StopFlag::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    async fn build_trial(&self, items: &[PackItem], output: &Path) -> Result<u64, PackerError> {
        metrics::TRIAL_ARCHIVES_BUILT.inc();
        match self.builder.build(&entries_of(items), output).await {
            Ok(size) => Ok(size),
            Err(e) => {
                discard(output).await;
                Err(e)
            }
        }
    }

    /// Writes `sources` to `output` if the result fits in `max_part_bytes`;
    /// otherwise to numbered parts next to it.
    ///
    /// Items keep their enumeration order. Each part holds the longest
    /// prefix of the remaining items that fits, found by binary search
    /// over trial builds. An item that alone exceeds the limit gets its own
    /// `_oversize` part. A stop request ends the run between parts and is
    /// reported through [`PackSummary::stopped`].
    pub async fn pack(
        &self,
        sources: &[PackSource],
        output: &Path,
        max_part_bytes: u64,
    ) -> Result<PackSummary, PackerError> {
        if max_part_bytes == 0 {
            return Err(PackerError::InvalidPartSize);
        }

        let owned = sources.to_vec();
        let items = tokio::task::spawn_blocking(move || collect_items(&owned))
            .await
            .map_err(|e| PackerError::Internal(e.to_string()))??;

        info!(
            output = %output.display(),
            items = items.len(),
            max_part_bytes,
            "Packing archive"
        );

        if self.stop.is_stopped() {
            info!("Stop requested, nothing packed");
            return Ok(PackSummary {
                parts: Vec::new(),
                stopped: true,
            });
        }

        let size = self.build_trial(&items, output).await?;
        if size <= max_part_bytes {
            metrics::ARCHIVE_PARTS_BUILT.inc();
            info!(path = %output.display(), size, "Archive fits in a single part");
            return Ok(PackSummary {
                parts: vec![PackedPart {
                    path: output.to_path_buf(),
                    size_bytes: size,
                    entries: items.iter().map(|i| i.entries.len()).sum(),
                    items: names_of(&items),
                    oversize: false,
                }],
                stopped: false,
            });
        }

        debug!(size, max_part_bytes, "Archive too large, splitting");
        discard(output).await;

        let mut parts = Vec::new();
        let mut stopped = false;
        let mut start = 0;
        while start < items.len() {
            if self.stop.is_stopped() {
                info!(parts = parts.len(), "Stop requested, ending packing early");
                stopped = true;
                break;
            }

            let number = parts.len() + 1;
            let remaining = &items[start..];
            let (taken, part) = self
                .pack_prefix(remaining, output, number, max_part_bytes)
                .await?;
            info!(
                path = %part.path.display(),
                size = part.size_bytes,
                items = taken,
                oversize = part.oversize,
                "Archive part written"
            );
            metrics::ARCHIVE_PARTS_BUILT.inc();
            parts.push(part);
            start += taken;
        }
        Ok(PackSummary { parts, stopped })
    }

    /// Writes the longest fitting prefix of `items` as part `number`.
    async fn pack_prefix(
        &self,
        items: &[PackItem],
        output: &Path,
        number: usize,
        max_part_bytes: u64,
    ) -> Result<(usize, PackedPart), PackerError> {
        // Invariant: a prefix of `lo` items fits, one of `hi + 1` does not.
        let mut lo = 0;
        let mut hi = items.len();
        let mut best: Option<(PathBuf, u64)> = None;

        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            let trial = trial_path(output);
            let size = match self.build_trial(&items[..mid], &trial).await {
                Ok(size) => size,
                Err(e) => {
                    if let Some((ref path, _)) = best {
                        discard(path).await;
                    }
                    return Err(e);
                }
            };
            debug!(part = number, items = mid, size, "Trial archive built");

            if size <= max_part_bytes {
                if let Some((previous, _)) = best.replace((trial, size)) {
                    discard(&previous).await;
                }
                lo = mid;
            } else {
                discard(&trial).await;
                hi = mid - 1;
            }
        }

        if let Some((trial, size)) = best {
            let path = part_path(output, number, false);
            fs::rename(&trial, &path).await?;
            let included = &items[..lo];
            return Ok((
                lo,
                PackedPart {
                    path,
                    size_bytes: size,
                    entries: included.iter().map(|i| i.entries.len()).sum(),
                    items: names_of(included),
                    oversize: false,
                },
            ));
        }

        let item = &items[..1];
        warn!(item = %item[0].name, max_part_bytes, "Item exceeds part size, writing oversize part");
        let path = part_path(output, number, true);
        let size = self.build_trial(item, &path).await?;
        Ok((
            1,
            PackedPart {
                path,
                size_bytes: size,
                entries: item[0].entries.len(),
                items: names_of(item),
                oversize: true,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::ZipArchiveBuilder;
    use crate::testing::FakeArchiveBuilder;
    use tempfile::TempDir;

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn zip_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".zip"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_part_path() {
        let out = Path::new("/tmp/export.zip");
        assert_eq!(part_path(out, 2, false), PathBuf::from("/tmp/export_part2.zip"));
        assert_eq!(
            part_path(out, 3, true),
            PathBuf::from("/tmp/export_part3_oversize.zip")
        );
    }

    #[test]
    fn test_collect_items_groups_thumbnails() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("organized/doc-a/a.webp"), b"a");
        write(&dir.path().join("organized/doc-b/b.webp"), b"b");
        write(&dir.path().join("thumbs/doc-a/a_gallery.webp"), b"t");
        write(&dir.path().join("thumbs/orphan/x_gallery.webp"), b"t");

        let sources = vec![
            PackSource::new(dir.path().join("organized"), ""),
            PackSource::new(dir.path().join("thumbs"), "thumbnails"),
        ];
        let items = collect_items(&sources).unwrap();

        assert_eq!(names_of(&items), vec!["doc-a", "doc-b", "thumbnails/orphan"]);
        let names: Vec<_> = items[0].entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["doc-a/a.webp", "thumbnails/doc-a/a_gallery.webp"]);
    }

    #[tokio::test]
    async fn test_single_archive_when_it_fits() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("src/doc/a.txt"), b"hello");
        let output = dir.path().join("out/export.zip");

        let packer = ArchivePacker::new(ZipArchiveBuilder::default());
        let parts = packer
            .pack(&[PackSource::new(dir.path().join("src"), "")], &output, 1024 * 1024)
            .await
            .unwrap()
            .parts;

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].path, output);
        assert_eq!(zip_files(&dir.path().join("out")), vec!["export.zip"]);
    }

    #[tokio::test]
    async fn test_split_into_parts() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            write(&dir.path().join(format!("src/item{:02}/f.bin", i)), &[0u8; 250]);
        }
        let output = dir.path().join("out/export.zip");

        let builder = FakeArchiveBuilder::new();
        let packer = ArchivePacker::new(builder.clone());
        let parts = packer
            .pack(&[PackSource::new(dir.path().join("src"), "")], &output, 1000)
            .await
            .unwrap()
            .parts;

        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.size_bytes <= 1000 && !p.oversize));
        let counts: Vec<_> = parts.iter().map(|p| p.items.len()).collect();
        assert_eq!(counts, vec![4, 4, 2]);
        assert_eq!(
            zip_files(&dir.path().join("out")),
            vec!["export_part1.zip", "export_part2.zip", "export_part3.zip"]
        );
    }

    fn ceil_log2(n: usize) -> usize {
        (usize::BITS - (n.max(1) - 1).leading_zeros()) as usize
    }

    #[tokio::test]
    async fn test_trial_builds_stay_logarithmic() {
        let layouts: [[u64; 10]; 3] = [
            [250; 10],
            [100, 900, 100, 100, 1500, 300, 300, 300, 50, 950],
            [990, 990, 990, 990, 990, 990, 990, 990, 990, 990],
        ];

        for sizes in layouts {
            let dir = TempDir::new().unwrap();
            let builder = FakeArchiveBuilder::new();
            for (i, bytes) in sizes.iter().enumerate() {
                write(&dir.path().join(format!("src/item{:02}/f.bin", i)), b"x");
                builder.set_size(format!("item{:02}/f.bin", i), *bytes).await;
            }

            let summary = ArchivePacker::new(builder.clone())
                .pack(
                    &[PackSource::new(dir.path().join("src"), "")],
                    &dir.path().join("export.zip"),
                    1000,
                )
                .await
                .unwrap();

            let parts = summary.parts.len();
            let bound = 1 + parts * (ceil_log2(sizes.len()) + 1);
            let builds = builder.build_count().await;
            assert!(
                builds <= bound,
                "{} trial builds for {} parts exceeds {} ({:?})",
                builds,
                parts,
                bound,
                sizes
            );
            let stored: usize = summary.parts.iter().map(|p| p.items.len()).sum();
            assert_eq!(stored, sizes.len());
        }
    }

    #[tokio::test]
    async fn test_stop_before_split_is_reported() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            write(&dir.path().join(format!("src/item{}/f.bin", i)), &[0u8; 600]);
        }
        let output = dir.path().join("out/export.zip");

        let stop = StopFlag::new();
        stop.stop();
        let builder = FakeArchiveBuilder::new();
        let summary = ArchivePacker::new(builder.clone())
            .with_stop(stop)
            .pack(&[PackSource::new(dir.path().join("src"), "")], &output, 1000)
            .await
            .unwrap();

        assert!(summary.stopped);
        assert!(summary.parts.is_empty());
        assert_eq!(builder.build_count().await, 0);
    }

    /// Sets the stop flag once `after` archives have been built.
    struct StopAfter {
        inner: FakeArchiveBuilder,
        stop: StopFlag,
        after: usize,
    }

    #[async_trait::async_trait]
    impl ArchiveBuilder for StopAfter {
        async fn build(&self, entries: &[ArchiveEntry], output: &Path) -> Result<u64, PackerError> {
            let size = self.inner.build(entries, output).await?;
            if self.inner.build_count().await >= self.after {
                self.stop.stop();
            }
            Ok(size)
        }
    }

    #[tokio::test]
    async fn test_stop_between_parts_is_reported() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            write(&dir.path().join(format!("src/item{}/f.bin", i)), &[0u8; 600]);
        }
        let output = dir.path().join("out/export.zip");

        // Whole tree, then two trials for the first part.
        let stop = StopFlag::new();
        let builder = StopAfter {
            inner: FakeArchiveBuilder::new(),
            stop: stop.clone(),
            after: 3,
        };
        let summary = ArchivePacker::new(builder)
            .with_stop(stop)
            .pack(&[PackSource::new(dir.path().join("src"), "")], &output, 1000)
            .await
            .unwrap();

        assert!(summary.stopped);
        assert_eq!(summary.parts.len(), 1);
        assert_eq!(summary.parts[0].items, vec!["item0"]);
        assert_eq!(zip_files(&dir.path().join("out")), vec!["export_part1.zip"]);
    }

    #[tokio::test]
    async fn test_complete_split_is_not_stopped() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            write(&dir.path().join(format!("src/item{}/f.bin", i)), &[0u8; 600]);
        }

        let summary = ArchivePacker::new(FakeArchiveBuilder::new())
            .pack(
                &[PackSource::new(dir.path().join("src"), "")],
                &dir.path().join("export.zip"),
                1000,
            )
            .await
            .unwrap();

        assert!(!summary.stopped);
        assert_eq!(summary.parts.len(), 4);
    }

    #[tokio::test]
    async fn test_oversize_item_isolated() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("src/a/f.bin"), &[0u8; 300]);
        write(&dir.path().join("src/b/f.bin"), &[0u8; 5000]);
        write(&dir.path().join("src/c/f.bin"), &[0u8; 300]);
        let output = dir.path().join("export.zip");

        let packer = ArchivePacker::new(FakeArchiveBuilder::new());
        let parts = packer
            .pack(&[PackSource::new(dir.path().join("src"), "")], &output, 1000)
            .await
            .unwrap()
            .parts;

        let summary: Vec<_> = parts.iter().map(|p| (p.items.clone(), p.oversize)).collect();
        assert_eq!(
            summary,
            vec![
                (vec!["a".to_string()], false),
                (vec!["b".to_string()], true),
                (vec!["c".to_string()], false),
            ]
        );
        assert!(parts[1].path.ends_with("export_part2_oversize.zip"));
    }

    #[tokio::test]
    async fn test_zero_part_size_rejected() {
        let dir = TempDir::new().unwrap();
        let packer = ArchivePacker::new(FakeArchiveBuilder::new());
        let result = packer
            .pack(&[PackSource::new(dir.path(), "")], &dir.path().join("x.zip"), 0)
            .await;
        assert!(matches!(result, Err(PackerError::InvalidPartSize)));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let packer = ArchivePacker::new(FakeArchiveBuilder::new());
        let result = packer
            .pack(
                &[PackSource::new(dir.path().join("nope"), "")],
                &dir.path().join("x.zip"),
                100,
            )
            .await;
        assert!(matches!(result, Err(PackerError::SourceNotFound(_))));
    }
}
