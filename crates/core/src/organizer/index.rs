//! Lookup of produced derivatives by identifier.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

fn is_excluded(entry: &DirEntry, excluded: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && excluded
            .iter()
            .any(|name| entry.file_name().to_string_lossy().eq_ignore_ascii_case(name))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Candidate file stems for an identifier cell.
///
/// `IMG_0001.jpg` also matches the derivative `IMG_0001.webp`.
fn lookup_keys(identifier: &str) -> Vec<&str> {
    let mut keys = vec![identifier];
    if let Some(stem) = Path::new(identifier).file_stem().and_then(|s| s.to_str()) {
        if stem != identifier && !stem.is_empty() {
            keys.push(stem);
        }
    }
    keys
}

/// Name to path index of every derivative under a root.
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    entries: HashMap<String, PathBuf>,
}

impl AssetIndex {
    /// Scans `root` once, skipping `excluded` directory names.
    ///
    /// On duplicate names the first path in walk order wins.
    pub fn build(root: &Path, extension: &str, excluded: &[String]) -> Self {
        let mut entries: HashMap<String, PathBuf> = HashMap::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_excluded(e, excluded));

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || !has_extension(entry.path(), extension) {
                continue;
            }
            let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(existing) = entries.get(stem) {
                warn!(
                    name = stem,
                    kept = %existing.display(),
                    ignored = %entry.path().display(),
                    "Duplicate asset name"
                );
                continue;
            }
            entries.insert(stem.to_string(), entry.path().to_path_buf());
        }

        debug!(root = %root.display(), assets = entries.len(), "Asset index built");
        Self { entries }
    }

    pub fn get(&self, identifier: &str) -> Option<&Path> {
        lookup_keys(identifier.trim())
            .into_iter()
            .find_map(|key| self.entries.get(key))
            .map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True when `path` resolves to a location inside `root`, links included.
fn is_within(root: &Path, path: &Path) -> bool {
    match (root.canonicalize(), path.canonicalize()) {
        (Ok(root), Ok(path)) => path.starts_with(root),
        _ => false,
    }
}

/// Resolves an origin-folder cell to a directory under `root`.
///
/// Tries a direct join first, then searches for a directory whose name
/// matches the value's final segment. Values with `.` or `..` segments
/// never resolve.
pub fn resolve_origin_folder(root: &Path, value: &str, excluded: &[String]) -> Option<PathBuf> {
    let value = value.trim().trim_matches(|c| c == '/' || c == '\\');
    if value.is_empty() {
        return None;
    }

    let normalized = value.replace('\\', "/");
    let relative = Path::new(&normalized);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        || normalized.split('/').any(|segment| segment == ".")
    {
        warn!(origin_folder = value, "Origin folder leaves the asset root, ignoring");
        return None;
    }

    let direct = root.join(relative);
    if direct.is_dir() && is_within(root, &direct) {
        return Some(direct);
    }

    let target = normalized.rsplit('/').next()?;
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e, excluded))
        .filter_map(|e| e.ok())
        .find(|e| e.depth() > 0 && e.file_type().is_dir() && e.file_name().to_string_lossy() == target)
        .map(|e| e.into_path())
}

/// Finds a derivative for `identifier` inside `folder` and its subfolders.
pub fn find_in_folder(
    folder: &Path,
    identifier: &str,
    extension: &str,
    excluded: &[String],
) -> Option<PathBuf> {
    let keys = lookup_keys(identifier.trim());
    for key in &keys {
        let direct = folder.join(format!("{}.{}", key, extension));
        if direct.is_file() {
            return Some(direct);
        }
    }

    WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e, excluded))
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().is_file()
                && has_extension(e.path(), extension)
                && e.path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| keys.contains(&stem))
        })
        .map(|e| e.into_path())
}
