//! Packer module: size-bounded ZIP output.
//!
//! The whole tree is first written as a single archive. When that exceeds
//! the ceiling, top-level items are packed in order into numbered parts,
//! each the longest prefix that fits (binary search over trial builds).
//! Archive construction sits behind the [`ArchiveBuilder`] trait so the
//! search can be exercised without compressing anything.
//!
//! # Example
//!
//! ```ignore
//! use leggio_core::packer::{ArchivePacker, PackSource, ZipArchiveBuilder};
//!
//! let packer = ArchivePacker::new(ZipArchiveBuilder::new(9));
//! let sources = PackSource::organized_layout(output_root, "thumbnails");
//! let summary = packer.pack(&sources, Path::new("export.zip"), 2 << 30).await?;
//! ```

mod builder;
mod config;
mod error;
mod pack;
mod types;

pub use builder::{ArchiveBuilder, ZipArchiveBuilder};
pub use config::PackerConfig;
pub use error::PackerError;
pub use pack::{collect_items, part_path, ArchivePacker};
pub use types::{ArchiveEntry, PackItem, PackSource, PackSummary, PackedPart};
