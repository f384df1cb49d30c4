use std::path::Path;

use serde_json::Value;

use super::{Content, FileReader, read_to_string};
use crate::error::{Error, Result};

/// JSON documents. A top-level array yields one row per element; any other
/// value is treated as a single document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReader;

impl FileReader for JsonReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        let value: Value = serde_json::from_str(&read_to_string(path)?)
            .map_err(|e| Error::file_read(path, e))?;

        Ok(match value {
            Value::Array(rows) => Content::Rows(rows),
            Value::String(text) => Content::Text(text),
            other => Content::Text(other.to_string()),
        })
    }
}

/// Newline-delimited JSON; one row per non-blank line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesReader;

impl FileReader for JsonLinesReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["jsonl"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        let source = read_to_string(path)?;
        let mut rows = Vec::new();

        for (line_no, line) in source.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(line).map_err(|e| {
                Error::file_read(path, format!("line {}: {e}", line_no + 1))
            })?;
            rows.push(row);
        }

        Ok(Content::Rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn array_becomes_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "a.json",
            r#"[{"key1": "value1"}, {"key2": "value2"}]"#,
        );

        assert_eq!(
            JsonReader.read(&path).unwrap(),
            Content::Rows(vec![
                json!({"key1": "value1"}),
                json!({"key2": "value2"})
            ])
        );
    }

    #[test]
    fn object_is_a_single_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "a.json", r#"{"title": "Fish"}"#);

        assert_eq!(
            JsonReader.read(&path).unwrap(),
            Content::Text(r#"{"title":"Fish"}"#.into())
        );
    }

    #[test]
    fn malformed_json_is_a_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "a.json", "[{");

        assert!(matches!(
            JsonReader.read(&path),
            Err(Error::FileRead { .. })
        ));
    }

    #[test]
    fn jsonl_skips_blank_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path =
            write(tmp.path(), "a.jsonl", "{\"n\": 1}\n\n  \n\"two\"\n");

        assert_eq!(
            JsonLinesReader.read(&path).unwrap(),
            Content::Rows(vec![json!({"n": 1}), json!("two")])
        );
    }

    #[test]
    fn jsonl_error_names_the_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "a.jsonl", "{\"n\": 1}\nnope\n");

        let err = JsonLinesReader.read(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
