//! Reading CSV and spreadsheet files into records.

use calamine::{open_workbook_auto, Reader};
use std::path::Path;
use tracing::debug;

use super::error::OrganizerError;

/// One data row with its header names, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// 1-based data row in the source table, header excluded. Blank rows
    /// still count.
    row: usize,
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { row: 0, fields }
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    pub fn row(&self) -> usize {
        self.row
    }

    /// Value of `column`, if the column exists.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed value of `column`, `None` when missing or blank.
    pub fn non_blank(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    /// Columns in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parses `path` into records, choosing the reader by extension.
///
/// `.csv` is read as comma separated text; `.xlsx`, `.xlsm`, `.xls` and
/// `.ods` use the first worksheet. The first row is the header row.
pub fn read_table(path: &Path) -> Result<Vec<Record>, OrganizerError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let records = match ext.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xlsm" | "xls" | "ods" => read_spreadsheet(path)?,
        other => return Err(OrganizerError::UnsupportedFormat(other.to_string())),
    };

    debug!(path = %path.display(), records = records.len(), "Table loaded");
    Ok(records)
}

fn clean_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_string()
}

/// Pairs rows with headers; rows carry their source row number and
/// blank ones are dropped after numbering.
fn build_records(
    headers: &[String],
    rows: impl Iterator<Item = (usize, Vec<String>)>,
) -> Vec<Record> {
    rows.filter(|(_, row)| row.iter().any(|v| !v.trim().is_empty()))
        .map(|(number, row)| {
            let fields = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect();
            Record::new(fields).with_row(number)
        })
        .collect()
}

fn read_csv(path: &Path) -> Result<Vec<Record>, OrganizerError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let header_record = reader.headers()?;
    let header_line = header_record.position().map(|p| p.line()).unwrap_or(1);
    let headers: Vec<String> = header_record.iter().map(clean_header).collect();

    // The reader skips empty lines, so rows are numbered by their line
    // offset from the header.
    let mut rows = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let number = row
            .position()
            .map(|p| p.line().saturating_sub(header_line) as usize)
            .filter(|n| *n > 0)
            .unwrap_or(i + 1);
        rows.push((number, row.iter().map(str::to_string).collect()));
    }
    Ok(build_records(&headers, rows.into_iter()))
}

fn read_spreadsheet(path: &Path) -> Result<Vec<Record>, OrganizerError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| OrganizerError::Spreadsheet("workbook has no sheets".to_string()))?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<String>>())
        .enumerate();

    let headers: Vec<String> = match rows.next() {
        Some((_, header)) => header.iter().map(|h| clean_header(h)).collect(),
        None => return Ok(Vec::new()),
    };
    Ok(build_records(&headers, rows))
}
