use std::{collections::HashSet, path::Path};

use calamine::{Data, Reader, open_workbook_auto};
use serde_json::{Map, Number, Value};

use super::{Content, FileReader};
use crate::error::{Error, Result};

/// Comma-separated files with a header row; one row object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReader;

impl FileReader for CsvReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        let mut reader =
            csv::Reader::from_path(path).map_err(|e| Error::file_read(path, e))?;
        let headers = unique_headers(
            reader
                .headers()
                .map_err(|e| Error::file_read(path, e))?
                .iter()
                .map(str::to_string)
                .collect(),
        );

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::file_read(path, e))?;
            rows.push(row_object(&headers, record.iter().map(infer_cell)));
        }

        Ok(Content::Rows(rows))
    }
}

/// Spreadsheets; rows of the first worksheet keyed by its header row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelReader;

impl FileReader for ExcelReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["xlsx", "xls"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| Error::file_read(path, e))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| Error::file_read(path, "workbook has no sheets"))?
            .map_err(|e| Error::file_read(path, e))?;

        let mut sheet_rows = range.rows();
        let Some(header_row) = sheet_rows.next() else {
            return Ok(Content::Rows(Vec::new()));
        };
        let headers = unique_headers(
            header_row.iter().map(|cell| cell.to_string()).collect(),
        );

        let rows = sheet_rows
            .map(|cells| row_object(&headers, cells.iter().map(cell_value)))
            .collect();

        Ok(Content::Rows(rows))
    }
}

/// Make header names usable as object keys: blank headers become
/// `Unnamed: <column>`, and repeated names get `.1`, `.2`, ... suffixes
/// that do not clash with any other header.
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let named: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(column, header)| {
            if header.trim().is_empty() {
                format!("Unnamed: {column}")
            } else {
                header
            }
        })
        .collect();

    let mut taken: HashSet<String> = named.iter().cloned().collect();
    let mut seen = HashSet::new();
    named
        .into_iter()
        .map(|header| {
            if seen.insert(header.clone()) {
                return header;
            }
            let mut suffix = 1;
            loop {
                let candidate = format!("{header}.{suffix}");
                if taken.insert(candidate.clone()) {
                    seen.insert(candidate.clone());
                    return candidate;
                }
                suffix += 1;
            }
        })
        .collect()
}

/// One row object with a key for every header. Missing trailing cells are
/// null; cells beyond the last header are dropped.
fn row_object(
    headers: &[String],
    mut cells: impl Iterator<Item = Value>,
) -> Value {
    let row: Map<String, Value> = headers
        .iter()
        .map(|header| (header.clone(), cells.next().unwrap_or(Value::Null)))
        .collect();
    Value::Object(row)
}

/// Type a CSV cell the way a spreadsheet would: blanks become null,
/// numerals become numbers, everything else stays text.
fn infer_cell(cell: &str) -> Value {
    if cell.trim().is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.trim().parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = cell.trim().parse::<f64>()
        && let Some(number) = Number::from_f64(float)
    {
        return Value::Number(number);
    }
    Value::String(cell.to_string())
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => {
            Number::from_f64(*f).map_or(Value::Null, Value::Number)
        }
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            Value::String(s.clone())
        }
        other => Value::String(other.to_string()),
    }
}
