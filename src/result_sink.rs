use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::PipelineError;
use crate::models::OrderLogEntry;

/// Receives the order log of a finished run.
pub trait ResultSink: Send + Sync {
    fn describe(&self) -> String;
    fn write(&self, entries: &[OrderLogEntry]) -> Result<(), PipelineError>;
}

/// Appends one JSON object per line. Earlier runs are kept.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSink for JsonLinesSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn write(&self, entries: &[OrderLogEntry]) -> Result<(), PipelineError> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut buffer = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buffer)?;
        file.flush()?;
        Ok(())
    }
}

/// Collects entries in memory.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<OrderLogEntry>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<OrderLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    fn describe(&self) -> String {
        "in-memory".to_string()
    }

    fn write(&self, entries: &[OrderLogEntry]) -> Result<(), PipelineError> {
        let mut stored = self
            .entries
            .lock()
            .map_err(|_| PipelineError::Storage("result sink lock poisoned".to_string()))?;
        stored.extend_from_slice(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(client_id: &str) -> OrderLogEntry {
        OrderLogEntry {
            timestamp: Utc::now(),
            client_id: client_id.to_string(),
            client_name: "Ana Petrova".to_string(),
            quote_id: "q-1".to_string(),
            order_id: Some("TRK-1".to_string()),
            status: "CREATED".to_string(),
            price: Some(4.9),
            currency: Some("EUR".to_string()),
            pickup_order_code: "ORD-C1-1-001".to_string(),
            reason: None,
        }
    }

    #[test]
    fn test_json_lines_append_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("logs").join("orders.jsonl"));

        sink.write(&[entry("C1"), entry("C2")]).unwrap();
        sink.write(&[entry("C3")]).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("logs").join("orders.jsonl")).unwrap();
        let parsed: Vec<OrderLogEntry> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let ids: Vec<&str> = parsed.iter().map(|e| e.client_id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C3"]);
    }

    #[test]
    fn test_stable_field_names() {
        let value = serde_json::to_value(entry("C1")).unwrap();
        for field in [
            "timestamp",
            "client_id",
            "client_name",
            "quote_id",
            "order_id",
            "status",
            "price",
            "currency",
            "pickup_order_code",
            "reason",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::default();
        sink.write(&[entry("C1")]).unwrap();
        assert_eq!(sink.entries().len(), 1);
    }
}
