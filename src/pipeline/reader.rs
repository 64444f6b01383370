//! Record reader - open one raw input unit and yield it as a value
//! tree.
//!
//! JSON units go through a SIMD-accelerated parse first, falling back
//! to line-by-line `serde_json` for NDJSON exports. Delimited mapping
//! tables become an array of one object per row, all values text
//! (the reconciler coerces them against the schema).

use std::path::Path;

use serde_json::{Map, Value};

use crate::{KilnError, Result};

/// Read one input unit into a value tree. A byte-empty or
/// undecodable file is a [`KilnError::SourceUnreadable`].
pub fn read_unit(path: &Path) -> Result<Value> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(KilnError::SourceUnreadable(format!(
            "{}: empty file",
            path.display()
        )));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => read_delimited(&bytes, b',', path),
        Some("tsv") => read_delimited(&bytes, b'\t', path),
        _ => read_json(&bytes, path),
    }
}

/// Two-tier JSON parse: SIMD first, NDJSON fallback.
fn read_json(bytes: &[u8], path: &Path) -> Result<Value> {
    // simd-json parses in place, so give it scratch space and keep
    // the original for the fallback
    let mut scratch = bytes.to_vec();
    if let Ok(parsed) = simd_json::to_owned_value(&mut scratch) {
        let json = simd_json::to_string(&parsed).map_err(|e| {
            KilnError::SourceUnreadable(format!("{}: {e}", path.display()))
        })?;
        return serde_json::from_str(&json).map_err(|e| {
            KilnError::SourceUnreadable(format!("{}: {e}", path.display()))
        });
    }

    // NDJSON: one object per line
    let content = String::from_utf8_lossy(bytes);
    let mut records = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            KilnError::SourceUnreadable(format!(
                "{} line {}: {e}",
                path.display(),
                lineno + 1
            ))
        })?;
        records.push(value);
    }

    match records.len() {
        0 => Err(KilnError::SourceUnreadable(format!(
            "{}: no records",
            path.display()
        ))),
        1 => Ok(records.pop().unwrap_or(Value::Null)),
        _ => Ok(Value::Array(records)),
    }
}

/// Parse a delimited mapping table into an array of row objects.
/// Empty cells become null so "absent in source" survives
/// reconciliation.
fn read_delimited(bytes: &[u8], delimiter: u8, path: &Path) -> Result<Value> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| KilnError::SourceUnreadable(format!("{}: {e}", path.display())))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            KilnError::SourceUnreadable(format!("{}: {e}", path.display()))
        })?;
        let mut row = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            let value = if field.is_empty() {
                Value::Null
            } else {
                Value::String(field.to_string())
            };
            row.insert(header.to_string(), value);
        }
        rows.push(Value::Object(row));
    }

    Ok(Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_unit(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn reads_nested_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_unit(&dir, "match.json", br#"{"match_id": 7, "events": []}"#);

        let value = read_unit(&path).unwrap();
        assert_eq!(value, json!({"match_id": 7, "events": []}));
    }

    #[test]
    fn reads_ndjson_as_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_unit(
            &dir,
            "frames.jsonl",
            b"{\"frame\": 1}\n{\"frame\": 2}\n\n{\"frame\": 3}\n",
        );

        let value = read_unit(&path).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[test]
    fn reads_csv_mapping_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_unit(
            &dir,
            "teams.csv",
            b"team_id,team_name,stadium\n1,Alpha,\n2,Beta,Beta Park\n",
        );

        let value = read_unit(&path).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["team_name"], json!("Alpha"));
        assert_eq!(rows[0]["stadium"], json!(null));
        assert_eq!(rows[1]["stadium"], json!("Beta Park"));
    }

    #[test]
    fn empty_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_unit(&dir, "empty.json", b"");

        let err = read_unit(&path).unwrap_err();
        assert!(matches!(err, KilnError::SourceUnreadable(_)));
    }

    #[test]
    fn garbage_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_unit(&dir, "bad.json", b"{not json at all");

        let err = read_unit(&path).unwrap_err();
        assert!(matches!(err, KilnError::SourceUnreadable(_)));
    }
}
