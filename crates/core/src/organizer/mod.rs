//! Organizer module: metadata-driven regrouping of derivatives.
//!
//! Reads a CSV or spreadsheet, resolves each record's asset (globally by
//! identifier, or inside a declared origin folder), and copies it into
//! `organized/<slug>/` with its thumbnails under `organized_thumbnails/`.
//! One `metadata.json` per slug collects document fields and image fields,
//! with `field_lang` / `field[lang]` columns folded into language maps.

mod config;
mod error;
mod fields;
mod index;
mod mapping;
mod organize;
mod tabular;
mod types;

pub use config::OrganizerConfig;
pub use error::OrganizerError;
pub use fields::{is_special, split_language_column, LanguageGroups};
pub use index::{find_in_folder, resolve_origin_folder, AssetIndex};
pub use mapping::{CsvMapping, FieldSpec, MappingLeaf};
pub use organize::{
    slug, DocumentReorganizer, METADATA_FILE, ORGANIZED_DIR, ORGANIZED_THUMBNAILS_DIR,
};
pub use tabular::{read_table, Record};
pub use types::{DocumentFolder, OrganizeProgress, OrganizeSummary, SkipReason, SkippedRecord};
