//! Field extraction with multi-language grouping.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::{Map, Value};

use super::mapping::{FieldSpec, MappingLeaf};
use super::tabular::Record;

/// `title_en`
static UNDERSCORE_LANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+)_([a-z]{2})$").unwrap());
/// `title[en]`
static BRACKET_LANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+)\[([a-z]{2})\]$").unwrap());

/// Fields that always resolve to a plain string.
const SPECIAL_FIELDS: &[&str] = &[
    "identifier",
    "groupBy",
    "active",
    "date",
    "language",
    "origin_folder",
];

/// Document keys used for routing rather than description.
pub const ROUTING_FIELDS: &[&str] = &["identifier", "groupBy", "origin_folder"];

/// Whether `name` bypasses language grouping.
pub fn is_special(name: &str) -> bool {
    SPECIAL_FIELDS.contains(&name) || name.starts_with("metadata_")
}

/// Splits `prefix_lang` or `prefix[lang]` into its parts.
pub fn split_language_column(column: &str) -> Option<(&str, &str)> {
    let caps = BRACKET_LANG
        .captures(column)
        .or_else(|| UNDERSCORE_LANG.captures(column))?;
    let prefix = caps.get(1)?.as_str().trim_end();
    let lang = caps.get(2)?.as_str();
    if prefix.is_empty() {
        return None;
    }
    Some((prefix, lang))
}

/// Language variants of one record, grouped by column prefix.
#[derive(Debug, Clone, Default)]
pub struct LanguageGroups {
    /// Prefix to `(lang, value)` pairs in header order; blanks omitted.
    groups: Vec<(String, Vec<(String, String)>)>,
}

impl LanguageGroups {
    pub fn from_record(record: &Record) -> Self {
        let mut groups: Vec<(String, Vec<(String, String)>)> = Vec::new();
        for (column, value) in record.iter() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let Some((prefix, lang)) = split_language_column(column) else {
                continue;
            };
            let entry = match groups.iter_mut().position(|(p, _)| p == prefix) {
                Some(i) => &mut groups[i].1,
                None => {
                    groups.push((prefix.to_string(), Vec::new()));
                    let last = groups.len() - 1;
                    &mut groups[last].1
                }
            };
            entry.push((lang.to_string(), value.to_string()));
        }
        Self { groups }
    }

    /// Non-blank variants for `prefix`.
    pub fn get(&self, prefix: &str) -> Option<&[(String, String)]> {
        self.groups
            .iter()
            .find(|(p, _)| p == prefix.trim())
            .map(|(_, variants)| variants.as_slice())
            .filter(|variants| !variants.is_empty())
    }

    /// First non-blank variant in header order.
    pub fn first_value(&self, prefix: &str) -> Option<&str> {
        self.get(prefix)
            .and_then(|variants| variants.first())
            .map(|(_, value)| value.as_str())
    }

    /// Language map for `prefix`, keyed by language code.
    pub fn to_value(&self, prefix: &str) -> Option<Value> {
        let variants = self.get(prefix)?;
        let map: Map<String, Value> = variants
            .iter()
            .map(|(lang, value)| (lang.clone(), Value::String(value.clone())))
            .collect();
        Some(Value::Object(map))
    }
}

/// Resolves `column` to a plain string: the cell when the column exists,
/// otherwise the mapping text itself.
fn scalar(record: &Record, column: &str) -> Value {
    match record.get(column) {
        Some(value) => Value::String(value.trim().to_string()),
        None => Value::String(column.to_string()),
    }
}

/// Resolves one mapping entry against a record.
///
/// Returns `None` for a `_prefix` entry with no matching columns.
pub fn resolve_field(spec: &FieldSpec, record: &Record, languages: &LanguageGroups) -> Option<Value> {
    let column = match &spec.leaf {
        MappingLeaf::Verbatim(value) => return Some(value.clone()),
        MappingLeaf::Text(column) => column.as_str(),
    };

    if is_special(spec.name()) {
        return Some(scalar(record, column));
    }

    if let Some(map) = languages.to_value(column) {
        return Some(map);
    }

    if spec.is_language_prefix() {
        return record
            .get(column)
            .map(|value| Value::String(value.trim().to_string()));
    }

    Some(scalar(record, column))
}

/// Resolves every entry of a section into a nested JSON object.
pub fn resolve_section(
    specs: &[FieldSpec],
    record: &Record,
    languages: &LanguageGroups,
    skip: &[&str],
) -> Map<String, Value> {
    let mut out = Map::new();
    for spec in specs {
        if skip.contains(&spec.key.as_str()) {
            continue;
        }
        if let Some(value) = resolve_field(spec, record, languages) {
            insert_path(&mut out, spec.output_key(), value);
        }
    }
    out
}

/// Inserts `value` at a dot-separated path, creating objects on the way.
fn insert_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}
