//! Archive construction.

use async_trait::async_trait;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::PackerError;
use super::types::ArchiveEntry;

/// Builds one archive and reports its size.
///
/// Compressed size is only known after compressing, so the packer probes
/// candidate parts by building them through this trait.
#[async_trait]
pub trait ArchiveBuilder: Send + Sync {
    /// Writes `entries` to `output` and returns the file size in bytes.
    async fn build(&self, entries: &[ArchiveEntry], output: &Path) -> Result<u64, PackerError>;
}

/// Deflate ZIP writer.
#[derive(Debug, Clone)]
pub struct ZipArchiveBuilder {
    compression_level: i64,
}

impl ZipArchiveBuilder {
    pub fn new(compression_level: i64) -> Self {
        Self {
            compression_level: compression_level.clamp(0, 9),
        }
    }

    fn write(entries: &[ArchiveEntry], output: &Path, level: i64) -> Result<u64, PackerError> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(output)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(level))
            .large_file(true);

        for entry in entries {
            zip.start_file(entry.name.as_str(), options)?;
            let mut reader = BufReader::new(File::open(&entry.source)?);
            std::io::copy(&mut reader, &mut zip)?;
        }

        let writer = zip.finish()?;
        drop(writer);
        Ok(std::fs::metadata(output)?.len())
    }
}

impl Default for ZipArchiveBuilder {
    fn default() -> Self {
        Self::new(9)
    }
}

#[async_trait]
impl ArchiveBuilder for ZipArchiveBuilder {
    async fn build(&self, entries: &[ArchiveEntry], output: &Path) -> Result<u64, PackerError> {
        let entries = entries.to_vec();
        let output: PathBuf = output.to_path_buf();
        let level = self.compression_level;
        tokio::task::spawn_blocking(move || Self::write(&entries, &output, level))
            .await
            .map_err(|e| PackerError::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_zip_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, "hello ".repeat(100)).unwrap();

        let output = dir.path().join("out/test.zip");
        let entries = vec![ArchiveEntry {
            source,
            name: "doc/a.txt".to_string(),
        }];
        let size = ZipArchiveBuilder::default().build(&entries, &output).await.unwrap();
        assert_eq!(size, std::fs::metadata(&output).unwrap().len());

        let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut file = archive.by_name("doc/a.txt").unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents.len(), 600);
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let entries = vec![ArchiveEntry {
            source: dir.path().join("missing"),
            name: "missing".to_string(),
        }];
        let result = ZipArchiveBuilder::default()
            .build(&entries, &dir.path().join("x.zip"))
            .await;
        assert!(matches!(result, Err(PackerError::Io(_))));
    }
}
