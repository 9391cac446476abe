//! Directory tree enumeration.
//!
//! Lists every directory under a root exactly once, pruning excluded
//! names and protecting against symlink cycles, runaway depth and
//! over-long paths.

mod tree;

pub use tree::{SkipReason, SkippedPath, TreeWalker, WalkReport, WalkedDir, WalkerConfig};
