//! FileDriver - one data file per entity, whole-file rewrite per mutation.
//!
//! Every mutating call reads the entire file, mutates the in-memory vector,
//! and rewrites the file. O(n) per operation; acceptable for
//! small-to-moderate collections. There is no locking: concurrent writers
//! race on the read-modify-rewrite cycle (documented, last-write-wins).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DriverError, StorageDriver};
use crate::record::{Filters, Record};

/// On-disk representation of the entity's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Pretty-printed JSON array of records.
    Json,
    /// One JSON record per line, newline-delimited.
    Jsonl,
    /// Header row + comma-split rows. Cells are not escaped: values
    /// containing commas or newlines will not round-trip.
    Csv,
}

/// Filesystem-backed storage driver.
pub struct FileDriver {
    path: PathBuf,
    format: FileFormat,
    key_field: String,
}

impl FileDriver {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat, key_field: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format,
            key_field: key_field.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> Result<Vec<Record>, DriverError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            // A file that does not exist yet is an empty collection.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match self.format {
            FileFormat::Json => {
                if text.trim().is_empty() {
                    Ok(Vec::new())
                } else {
                    Ok(serde_json::from_str(&text)?)
                }
            }
            FileFormat::Jsonl => text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str(line).map_err(DriverError::from))
                .collect(),
            FileFormat::Csv => Ok(parse_csv(&text)),
        }
    }

    fn store_all(&self, records: &[Record]) -> Result<(), DriverError> {
        let text = match self.format {
            FileFormat::Json => serde_json::to_string_pretty(records)?,
            FileFormat::Jsonl => {
                let mut out = String::new();
                for record in records {
                    out.push_str(&serde_json::to_string(record)?);
                    out.push('\n');
                }
                out
            }
            FileFormat::Csv => render_csv(records),
        };
        fs::write(&self.path, text)?;
        Ok(())
    }

    fn key_of<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record.get(&self.key_field).and_then(Value::as_str)
    }
}

impl StorageDriver for FileDriver {
    fn initialize(&self) -> Result<(), DriverError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            let empty = match self.format {
                FileFormat::Json => "[]",
                FileFormat::Jsonl | FileFormat::Csv => "",
            };
            fs::write(&self.path, empty)?;
        }
        Ok(())
    }

    fn create(&self, record: Record) -> Result<Record, DriverError> {
        let mut records = self.load_all()?;

        if let Some(key) = self.key_of(&record) {
            if records.iter().any(|r| self.key_of(r) == Some(key)) {
                return Err(DriverError::Duplicate { id: key.to_string() });
            }
        }

        records.push(record.clone());
        self.store_all(&records)?;
        Ok(record)
    }

    fn read(&self, query: &Filters) -> Result<Option<Record>, DriverError> {
        let records = self.load_all()?;
        Ok(records.into_iter().find(|r| r.matches(query)))
    }

    fn update(&self, id: &str, patch: &Record) -> Result<Record, DriverError> {
        let mut records = self.load_all()?;
        let index = records
            .iter()
            .position(|r| self.key_of(r) == Some(id))
            .ok_or_else(|| DriverError::NotFound { id: id.to_string() })?;

        let merged = records[index].apply_patch(patch.fields());
        records[index] = merged.clone();
        self.store_all(&records)?;
        Ok(merged)
    }

    fn delete(&self, id: &str) -> Result<(), DriverError> {
        let mut records = self.load_all()?;
        let before = records.len();
        records.retain(|r| self.key_of(r) != Some(id));
        if records.len() == before {
            return Err(DriverError::NotFound { id: id.to_string() });
        }
        self.store_all(&records)?;
        Ok(())
    }

    fn list(&self, filters: &Filters) -> Result<Vec<Record>, DriverError> {
        let records = self.load_all()?;
        Ok(records.into_iter().filter(|r| r.matches(filters)).collect())
    }
}

/// Minimal CSV: header row seeds column order, cells split on commas with no
/// escaping. Non-string scalars are carried as their JSON text; strings whose
/// text would itself parse as JSON are JSON-quoted so they load back as
/// strings (`"1"` must stay a string, not become a number).
fn render_csv(records: &[Record]) -> String {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for field in record.fields().keys() {
            if !columns.iter().any(|c| c == field) {
                columns.push(field.clone());
            }
        }
    }

    let mut out = columns.join(",");
    out.push('\n');

    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| match record.get(column) {
                None | Some(Value::Null) => String::new(),
                Some(value) => render_cell(value),
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if serde_json::from_str::<Value>(s).is_ok() {
                // Ambiguous text; the JSON-quoted form disambiguates it.
                value.to_string()
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

fn parse_csv(text: &str) -> Vec<Record> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split(',').collect();

    lines
        .map(|line| {
            let mut record = Record::new();
            for (column, cell) in columns.iter().zip(line.split(',')) {
                if cell.is_empty() {
                    continue;
                }
                let value = parse_cell(cell);
                record.set(*column, value);
            }
            record
        })
        .collect()
}

/// Interpret a cell as a JSON scalar where possible, else a plain string.
/// The inverse of [`render_cell`]: quoted cells come back as strings.
fn parse_cell(cell: &str) -> Value {
    match serde_json::from_str::<Value>(cell) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::String(_))) => value,
        _ => Value::String(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record(map),
            _ => panic!("expected object"),
        }
    }

    fn driver(dir: &TempDir, format: FileFormat) -> FileDriver {
        let name = match format {
            FileFormat::Json => "items.json",
            FileFormat::Jsonl => "items.jsonl",
            FileFormat::Csv => "items.csv",
        };
        let driver = FileDriver::new(dir.path().join(name), format, "id");
        driver.initialize().unwrap();
        driver
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Json);
        driver
            .create(record(json!({ "id": "1", "name": "a" })))
            .unwrap();

        driver.initialize().unwrap();
        assert_eq!(driver.list(&Filters::new()).unwrap().len(), 1);
    }

    #[test]
    fn round_trip_all_formats() {
        for format in [FileFormat::Json, FileFormat::Jsonl, FileFormat::Csv] {
            let dir = TempDir::new().unwrap();
            let driver = driver(&dir, format);

            driver
                .create(record(json!({ "id": "1", "name": "Alarm A", "count": 3 })))
                .unwrap();

            let mut query = Filters::new();
            query.insert("id".into(), json!("1"));
            let loaded = driver.read(&query).unwrap().unwrap();

            assert_eq!(loaded.get("name"), Some(&json!("Alarm A")));
            assert_eq!(loaded.get("count"), Some(&json!(3)));
        }
    }

    #[test]
    fn create_detects_duplicate_keys() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Json);

        driver.create(record(json!({ "id": "1" }))).unwrap();
        let err = driver.create(record(json!({ "id": "1" }))).unwrap_err();
        assert_eq!(err, DriverError::Duplicate { id: "1".into() });
    }

    #[test]
    fn read_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Json);

        let mut query = Filters::new();
        query.insert("id".into(), json!("missing"));
        assert_eq!(driver.read(&query).unwrap(), None);
    }

    #[test]
    fn read_by_filter_scans_linearly() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Jsonl);

        driver
            .create(record(json!({ "id": "1", "severity": "low" })))
            .unwrap();
        driver
            .create(record(json!({ "id": "2", "severity": "high" })))
            .unwrap();

        let mut query = Filters::new();
        query.insert("severity".into(), json!("high"));
        let found = driver.read(&query).unwrap().unwrap();
        assert_eq!(found.id(), Some("2"));
    }

    #[test]
    fn update_merges_partial_fields() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Json);

        driver
            .create(record(json!({ "id": "1", "status": "a", "name": "keep" })))
            .unwrap();
        let updated = driver
            .update("1", &record(json!({ "status": "b" })))
            .unwrap();

        assert_eq!(updated.get("status"), Some(&json!("b")));
        assert_eq!(updated.get("name"), Some(&json!("keep")));
    }

    #[test]
    fn update_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Json);
        let err = driver.update("nope", &Record::new()).unwrap_err();
        assert_eq!(err, DriverError::NotFound { id: "nope".into() });
    }

    #[test]
    fn delete_is_final_and_not_found_twice() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Json);

        driver.create(record(json!({ "id": "1" }))).unwrap();
        driver.delete("1").unwrap();

        let mut query = Filters::new();
        query.insert("id".into(), json!("1"));
        assert_eq!(driver.read(&query).unwrap(), None);
        assert_eq!(
            driver.delete("1").unwrap_err(),
            DriverError::NotFound { id: "1".into() }
        );
    }

    #[test]
    fn list_filters_exact_match_and_combined() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Json);

        driver
            .create(record(json!({ "id": "1", "severity": "high", "source": "probe" })))
            .unwrap();
        driver
            .create(record(json!({ "id": "2", "severity": "high", "source": "api" })))
            .unwrap();
        driver
            .create(record(json!({ "id": "3", "severity": "low", "source": "probe" })))
            .unwrap();

        let mut filters = Filters::new();
        filters.insert("severity".into(), json!("high"));
        filters.insert("source".into(), json!("probe"));

        let matched = driver.list(&filters).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id(), Some("1"));
    }

    #[test]
    fn csv_numeric_looking_string_id_round_trips() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Csv);

        driver
            .create(record(json!({ "id": "1", "name": "Alarm A" })))
            .unwrap();

        let mut query = Filters::new();
        query.insert("id".into(), json!("1"));
        let loaded = driver.read(&query).unwrap().unwrap();
        assert_eq!(loaded.get("id"), Some(&json!("1")));

        let err = driver.create(record(json!({ "id": "1" }))).unwrap_err();
        assert_eq!(err, DriverError::Duplicate { id: "1".into() });

        let updated = driver
            .update("1", &record(json!({ "name": "Alarm B" })))
            .unwrap();
        assert_eq!(updated.get("name"), Some(&json!("Alarm B")));

        driver.delete("1").unwrap();
        assert_eq!(driver.read(&query).unwrap(), None);
    }

    #[test]
    fn csv_keeps_ambiguous_string_cells_as_strings() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Csv);

        driver
            .create(record(json!({
                "id": "a1",
                "code": "42",
                "active": "true",
                "count": 7,
                "flag": true
            })))
            .unwrap();

        let mut query = Filters::new();
        query.insert("id".into(), json!("a1"));
        let loaded = driver.read(&query).unwrap().unwrap();
        assert_eq!(loaded.get("code"), Some(&json!("42")));
        assert_eq!(loaded.get("active"), Some(&json!("true")));
        assert_eq!(loaded.get("count"), Some(&json!(7)));
        assert_eq!(loaded.get("flag"), Some(&json!(true)));
    }

    #[test]
    fn csv_cells_with_commas_do_not_round_trip() {
        // Documented fragility of the minimal CSV format.
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir, FileFormat::Csv);

        driver
            .create(record(json!({ "id": "1", "name": "a,b" })))
            .unwrap();

        let mut query = Filters::new();
        query.insert("id".into(), json!("1"));
        let loaded = driver.read(&query).unwrap().unwrap();
        assert_eq!(loaded.get("name"), Some(&json!("a")));
    }
}
