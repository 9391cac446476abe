//! Column mapping between a metadata table and the output JSON.

use serde_json::{Map, Value};
use std::path::Path;

use super::error::OrganizerError;

/// Suffix marking a key whose value names a multi-language column prefix.
pub const PREFIX_SUFFIX: &str = "_prefix";

/// Right-hand side of a mapping entry.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingLeaf {
    /// A column name, or a literal when no such column exists.
    Text(String),
    /// A non-string JSON value emitted unchanged.
    Verbatim(Value),
}

/// One flattened mapping entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Dot-separated output path.
    pub key: String,
    pub leaf: MappingLeaf,
}

impl FieldSpec {
    /// Final path segment.
    pub fn name(&self) -> &str {
        self.key.rsplit('.').next().unwrap_or(&self.key)
    }

    /// True when the key ends in `_prefix`.
    pub fn is_language_prefix(&self) -> bool {
        self.name().ends_with(PREFIX_SUFFIX) && self.name().len() > PREFIX_SUFFIX.len()
    }

    /// Output key with any `_prefix` suffix removed.
    pub fn output_key(&self) -> &str {
        if self.is_language_prefix() {
            &self.key[..self.key.len() - PREFIX_SUFFIX.len()]
        } else {
            &self.key
        }
    }

    /// Column name when the leaf is text.
    pub fn column(&self) -> Option<&str> {
        match &self.leaf {
            MappingLeaf::Text(column) => Some(column),
            MappingLeaf::Verbatim(_) => None,
        }
    }
}

/// Two-section mapping: document-level and image-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvMapping {
    pub document: Vec<FieldSpec>,
    pub image: Vec<FieldSpec>,
}

impl CsvMapping {
    /// Parses and validates a mapping document.
    pub fn from_json_str(json: &str) -> Result<Self, OrganizerError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Reads a mapping file from disk.
    pub async fn load(path: &Path) -> Result<Self, OrganizerError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&json)
    }

    pub fn from_value(value: &Value) -> Result<Self, OrganizerError> {
        let root = value
            .as_object()
            .ok_or_else(|| OrganizerError::InvalidMapping("expected a JSON object".to_string()))?;

        let section = |name: &str| -> Result<Vec<FieldSpec>, OrganizerError> {
            match root.get(name) {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(Value::Object(map)) => {
                    let mut specs = Vec::new();
                    flatten("", map, &mut specs);
                    Ok(specs)
                }
                Some(_) => Err(OrganizerError::InvalidMapping(format!(
                    "section '{}' must be an object",
                    name
                ))),
            }
        };

        let mapping = Self {
            document: section("document")?,
            image: section("image")?,
        };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Checks that the routing fields are present.
    pub fn validate(&self) -> Result<(), OrganizerError> {
        if self.document_column("identifier").is_none() {
            return Err(OrganizerError::MissingMappingField("document.identifier"));
        }
        if self.document_column("groupBy").is_none() {
            return Err(OrganizerError::MissingMappingField("document.groupBy"));
        }
        Ok(())
    }

    /// Column mapped to a top-level document key, if non-empty.
    pub fn document_column(&self, key: &str) -> Option<&str> {
        self.document
            .iter()
            .find(|spec| spec.key == key)
            .and_then(FieldSpec::column)
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn identifier_column(&self) -> &str {
        self.document_column("identifier").unwrap_or_default()
    }

    pub fn group_by_column(&self) -> &str {
        self.document_column("groupBy").unwrap_or_default()
    }

    pub fn origin_folder_column(&self) -> Option<&str> {
        self.document_column("origin_folder")
    }
}

fn flatten(prefix: &str, map: &Map<String, Value>, out: &mut Vec<FieldSpec>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(nested) => flatten(&path, nested, out),
            Value::String(column) => out.push(FieldSpec {
                key: path,
                leaf: MappingLeaf::Text(column.clone()),
            }),
            other => out.push(FieldSpec {
                key: path,
                leaf: MappingLeaf::Verbatim(other.clone()),
            }),
        }
    }
}
