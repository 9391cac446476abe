//! Archive builder that measures instead of compressing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::packer::{ArchiveBuilder, ArchiveEntry, PackerError};

/// Fake implementation of the ArchiveBuilder trait.
///
/// An archive's size is the sum of its entries' sizes: the byte table
/// value when one is set for the entry name, else the source file length.
/// The output file is a manifest listing the entry names, one per line.
#[derive(Debug, Clone, Default)]
pub struct FakeArchiveBuilder {
    sizes: Arc<RwLock<HashMap<String, u64>>>,
    builds: Arc<RwLock<Vec<Vec<String>>>>,
}

impl FakeArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the size counted for the entry stored as `name`.
    pub async fn set_size(&self, name: impl Into<String>, bytes: u64) {
        self.sizes.write().await.insert(name.into(), bytes);
    }

    /// Entry names of every build, in call order.
    pub async fn builds(&self) -> Vec<Vec<String>> {
        self.builds.read().await.clone()
    }

    pub async fn build_count(&self) -> usize {
        self.builds.read().await.len()
    }
}

#[async_trait]
impl ArchiveBuilder for FakeArchiveBuilder {
    async fn build(&self, entries: &[ArchiveEntry], output: &Path) -> Result<u64, PackerError> {
        let sizes = self.sizes.read().await.clone();
        let mut total = 0;
        for entry in entries {
            total += match sizes.get(&entry.name) {
                Some(bytes) => *bytes,
                None => tokio::fs::metadata(&entry.source).await?.len(),
            };
        }

        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, names.join("\n")).await?;
        self.builds.write().await.push(names);
        Ok(total)
    }
}
