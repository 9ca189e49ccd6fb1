//! Append-only JSON-lines log of every classification result

use crate::models::ClassificationResult;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One JSON object per line, appended in dispatch order
pub struct NdjsonLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl NdjsonLog {
    /// The parent directory is created on first append, not here
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, result: &ClassificationResult) -> Result<()> {
        let mut line = serde_json::to_string(result).context("Failed to encode result")?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("NDJSON log lock poisoned"))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;

    fn result(flow_index: u64) -> ClassificationResult {
        ClassificationResult {
            timestamp: "2024-05-01T12:00:00+00:00".to_string(),
            source_file: "/flows/a.csv".to_string(),
            flow_index,
            rf_prob: 0.9,
            rf_label: "DrDoS_DNS".to_string(),
            xgb_prob: 0.1,
            xgb_label: "BENIGN".to_string(),
            decision: Decision::Attack,
        }
    }

    #[test]
    fn test_append_creates_parent_and_writes_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = NdjsonLog::new(dir.path().join("logs").join("graylog_input.json"));

        log.append(&result(0)).unwrap();
        log.append(&result(1)).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["flow_index"], 0);
        assert_eq!(first["decision"], "ATTACK");
        assert_eq!(first["source_file"], "/flows/a.csv");
    }

    #[test]
    fn test_append_keeps_existing_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "{\"old\":true}\n").unwrap();

        NdjsonLog::new(&path).append(&result(5)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\"old\":true}\n"));
        assert_eq!(content.lines().count(), 2);
    }
}
