//! Iterative stack-based directory walker.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Walker limits and exclusions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Directory names never entered (compared case-insensitively).
    #[serde(default)]
    pub excluded_names: Vec<String>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum path length in characters.
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
}

fn default_max_depth() -> usize {
    50
}

fn default_max_path_len() -> usize {
    3500
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            excluded_names: Vec::new(),
            max_depth: default_max_depth(),
            max_path_len: default_max_path_len(),
        }
    }
}

/// One directory found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedDir {
    pub path: PathBuf,
    /// Path relative to the walk root (empty for the root).
    pub relative: PathBuf,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooDeep,
    PathTooLong,
    AlreadyVisited,
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Directories in depth-first enumeration order, root first.
    pub dirs: Vec<WalkedDir>,
    pub skipped: Vec<SkippedPath>,
}

/// Enumerates directories without recursion.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    config: WalkerConfig,
    excluded: HashSet<String>,
}

impl TreeWalker {
    pub fn new(config: WalkerConfig) -> Self {
        let excluded = config
            .excluded_names
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        Self { config, excluded }
    }

    /// Whether a directory name is excluded from traversal.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(&name.to_lowercase())
    }

    /// Walks `root`, returning every reachable directory once.
    ///
    /// Unreadable, too deep, too long or already-visited directories are
    /// reported in `skipped` and never abort the walk.
    pub fn walk(&self, root: &Path) -> WalkReport {
        let mut report = WalkReport::default();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut stack: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

        while let Some((path, depth)) = stack.pop() {
            if depth > self.config.max_depth {
                warn!(path = %path.display(), depth, "Skipping directory beyond max depth");
                report.skip(path, SkipReason::TooDeep);
                continue;
            }

            if path.as_os_str().to_string_lossy().chars().count() > self.config.max_path_len {
                warn!(path = %path.display(), "Skipping directory with over-long path");
                report.skip(path, SkipReason::PathTooLong);
                continue;
            }

            let canonical = match fs::canonicalize(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unresolvable directory");
                    report.skip(path, SkipReason::Unreadable);
                    continue;
                }
            };
            if !visited.insert(canonical) {
                warn!(path = %path.display(), "Skipping already visited directory (symlink cycle?)");
                report.skip(path, SkipReason::AlreadyVisited);
                continue;
            }

            let children = match self.child_dirs(&path) {
                Ok(children) => children,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable directory");
                    report.skip(path, SkipReason::Unreadable);
                    continue;
                }
            };

            let relative = path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            report.dirs.push(WalkedDir {
                path,
                relative,
                depth,
            });

            // Reverse so the first child is popped first
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }

        report
    }

    /// Sorted, non-excluded subdirectories of `dir`.
    pub fn child_dirs(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            // Follows symlinks; the visited set stops cycles
            let is_dir = fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let name = entry.file_name();
            if self.is_excluded(&name.to_string_lossy()) {
                continue;
            }
            children.push(entry.path());
        }
        children.sort();
        Ok(children)
    }
}

impl WalkReport {
    fn skip(&mut self, path: PathBuf, reason: SkipReason) {
        self.skipped.push(SkippedPath { path, reason });
    }
}
