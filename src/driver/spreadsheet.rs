//! SpreadsheetDriver - records as rows of a named sheet tab.
//!
//! A header row seeds column order; new fields append columns. Cells carry
//! strings as-is (JSON-quoted when the text would otherwise parse as a JSON
//! scalar, so `"1"` stays a string) and other scalars as their JSON text. The
//! transport sits behind [`SheetClient`]; a real client is subject to
//! external rate limits, which are not modeled here — client failures
//! surface as `Io` and are never retried internally. Callers wanting
//! resilience wrap the orchestrator themselves.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{DriverError, StorageDriver};
use crate::record::{Filters, Record};

/// Transport to a spreadsheet backend. Rows are plain string cells; the
/// first row is the header.
pub trait SheetClient: Send + Sync {
    fn read_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, DriverError>;
    fn write_rows(&self, tab: &str, rows: Vec<Vec<String>>) -> Result<(), DriverError>;
}

/// In-memory sheet for tests and local development.
#[derive(Clone, Default)]
pub struct InMemorySheet {
    tabs: Arc<RwLock<HashMap<String, Vec<Vec<String>>>>>,
}

impl InMemorySheet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SheetClient for InMemorySheet {
    fn read_rows(&self, tab: &str) -> Result<Vec<Vec<String>>, DriverError> {
        let tabs = self
            .tabs
            .read()
            .map_err(|_| DriverError::Io("sheet lock poisoned".into()))?;
        Ok(tabs.get(tab).cloned().unwrap_or_default())
    }

    fn write_rows(&self, tab: &str, rows: Vec<Vec<String>>) -> Result<(), DriverError> {
        let mut tabs = self
            .tabs
            .write()
            .map_err(|_| DriverError::Io("sheet lock poisoned".into()))?;
        tabs.insert(tab.to_string(), rows);
        Ok(())
    }
}

/// Spreadsheet storage driver.
pub struct SpreadsheetDriver {
    client: Arc<dyn SheetClient>,
    tab: String,
    key_field: String,
}

impl SpreadsheetDriver {
    pub fn new(
        client: Arc<dyn SheetClient>,
        tab: impl Into<String>,
        key_field: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tab: tab.into(),
            key_field: key_field.into(),
        }
    }

    fn load(&self) -> Result<(Vec<String>, Vec<Record>), DriverError> {
        let rows = self.client.read_rows(&self.tab)?;
        let mut iter = rows.into_iter();
        let Some(header) = iter.next() else {
            return Ok((Vec::new(), Vec::new()));
        };

        let records = iter
            .map(|row| {
                let mut record = Record::new();
                for (column, cell) in header.iter().zip(row) {
                    if cell.is_empty() {
                        continue;
                    }
                    record.set(column.clone(), parse_cell(&cell));
                }
                record
            })
            .collect();

        Ok((header, records))
    }

    fn store(&self, mut header: Vec<String>, records: &[Record]) -> Result<(), DriverError> {
        // New fields extend the header, existing column order is preserved.
        for record in records {
            for field in record.fields().keys() {
                if !header.iter().any(|c| c == field) {
                    header.push(field.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(records.len() + 1);
        rows.push(header.clone());
        for record in records {
            rows.push(
                header
                    .iter()
                    .map(|column| match record.get(column) {
                        None | Some(Value::Null) => String::new(),
                        Some(value) => render_cell(value),
                    })
                    .collect(),
            );
        }

        self.client.write_rows(&self.tab, rows)
    }

    fn key_of<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record.get(&self.key_field).and_then(Value::as_str)
    }
}

impl StorageDriver for SpreadsheetDriver {
    fn initialize(&self) -> Result<(), DriverError> {
        let rows = self.client.read_rows(&self.tab)?;
        if rows.is_empty() {
            // Seed the header with the key column; creates extend it.
            self.client
                .write_rows(&self.tab, vec![vec![self.key_field.clone()]])?;
        }
        Ok(())
    }

    fn create(&self, record: Record) -> Result<Record, DriverError> {
        let (header, mut records) = self.load()?;

        if let Some(key) = self.key_of(&record) {
            if records.iter().any(|r| self.key_of(r) == Some(key)) {
                return Err(DriverError::Duplicate { id: key.to_string() });
            }
        }

        records.push(record.clone());
        self.store(header, &records)?;
        Ok(record)
    }

    fn read(&self, query: &Filters) -> Result<Option<Record>, DriverError> {
        let (_, records) = self.load()?;
        Ok(records.into_iter().find(|r| r.matches(query)))
    }

    fn update(&self, id: &str, patch: &Record) -> Result<Record, DriverError> {
        let (header, mut records) = self.load()?;
        let index = records
            .iter()
            .position(|r| self.key_of(r) == Some(id))
            .ok_or_else(|| DriverError::NotFound { id: id.to_string() })?;

        let merged = records[index].apply_patch(patch.fields());
        records[index] = merged.clone();
        self.store(header, &records)?;
        Ok(merged)
    }

    fn delete(&self, id: &str) -> Result<(), DriverError> {
        let (header, mut records) = self.load()?;
        let before = records.len();
        records.retain(|r| self.key_of(r) != Some(id));
        if records.len() == before {
            return Err(DriverError::NotFound { id: id.to_string() });
        }
        self.store(header, &records)?;
        Ok(())
    }

    fn list(&self, filters: &Filters) -> Result<Vec<Record>, DriverError> {
        let (_, records) = self.load()?;
        Ok(records.into_iter().filter(|r| r.matches(filters)).collect())
    }
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

/// Interpret a cell as a JSON scalar where possible, else a plain string.
/// The inverse of [`render_cell`]: quoted cells come back as strings.
fn parse_cell(cell: &str) -> Value {
    match serde_json::from_str::<Value>(cell) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::String(_))) => value,
        _ => Value::String(cell.to_string()),
    }
}
