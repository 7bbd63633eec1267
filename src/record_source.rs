//! Where order rows come from.
//!
//! The pipeline only needs an ordered list of key/value rows. Reading them
//! from a spreadsheet is someone else's job; here a row export is read from
//! JSON.

use serde_json::Value;
use std::path::PathBuf;

use crate::errors::PipelineError;

pub trait RecordSource: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Returns every row in source order. Failure aborts the run.
    fn load(&self) -> Result<Vec<Value>, PipelineError>;
}

/// Reads a JSON export of the order sheet.
///
/// Two shapes are accepted: a bare array of rows, or a workbook-shaped object
/// mapping sheet names to row arrays, in which case `sheet` selects the rows.
pub struct JsonFileSource {
    path: PathBuf,
    sheet: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, sheet: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sheet: sheet.into(),
        }
    }
}

impl RecordSource for JsonFileSource {
    fn describe(&self) -> String {
        format!("{} (sheet {})", self.path.display(), self.sheet)
    }

    fn load(&self) -> Result<Vec<Value>, PipelineError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::RecordSource(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let document: Value = serde_json::from_str(&contents).map_err(|e| {
            PipelineError::RecordSource(format!("{} is not valid JSON: {}", self.path.display(), e))
        })?;
        rows_from_document(document, &self.sheet)
    }
}

fn rows_from_document(document: Value, sheet: &str) -> Result<Vec<Value>, PipelineError> {
    match document {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut sheets) => match sheets.remove(sheet) {
            Some(Value::Array(rows)) => Ok(rows),
            Some(_) => Err(PipelineError::RecordSource(format!(
                "sheet `{}` is not a list of rows",
                sheet
            ))),
            None => {
                let available: Vec<&String> = sheets.keys().collect();
                Err(PipelineError::RecordSource(format!(
                    "sheet `{}` not found (available: {:?})",
                    sheet, available
                )))
            }
        },
        _ => Err(PipelineError::RecordSource(
            "expected a list of rows or an object of sheets".to_string(),
        )),
    }
}

/// Rows held in memory. Used by tests and by callers that read rows themselves.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    rows: Vec<Value>,
}

impl VecSource {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }
}

impl RecordSource for VecSource {
    fn describe(&self) -> String {
        format!("in-memory ({} rows)", self.rows.len())
    }

    fn load(&self) -> Result<Vec<Value>, PipelineError> {
        Ok(self.rows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_bare_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", json!([{"client_id": "C1"}, {"client_id": "C2"}])).unwrap();

        let rows = JsonFileSource::new(file.path(), "FINAL_ORDERS").load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["client_id"], "C2");
    }

    #[test]
    fn test_workbook_selects_sheet() {
        let document = json!({
            "Sheet1": [{"client_id": "ignored"}],
            "FINAL_ORDERS": [{"client_id": "C1"}]
        });
        let rows = rows_from_document(document, "FINAL_ORDERS").unwrap();
        assert_eq!(rows, vec![json!({"client_id": "C1"})]);
    }

    #[test]
    fn test_missing_sheet_is_fatal() {
        let err = rows_from_document(json!({"Sheet1": []}), "FINAL_ORDERS").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("FINAL_ORDERS"));
    }

    #[test]
    fn test_unreadable_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonFileSource::new(dir.path().join("missing.json"), "FINAL_ORDERS")
            .load()
            .unwrap_err();
        assert!(matches!(err, PipelineError::RecordSource(_)));
    }
}
