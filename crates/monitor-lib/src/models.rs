//! Core data models for the flow monitor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Durable per-file progress cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCursor {
    pub path: String,
    /// Number of data rows consumed so far (never decreases)
    pub rows_done: u64,
    /// File size in bytes when the cursor was last written
    pub last_size: u64,
    /// File modification time (epoch seconds) when the cursor was last written
    pub last_mtime: i64,
}

/// Binary verdict for a single flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Attack,
    Benign,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Attack => "ATTACK",
            Decision::Benign => "BENIGN",
        }
    }

    pub fn is_attack(&self) -> bool {
        matches!(self, Decision::Attack)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ensemble rule for combining the two model votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionRule {
    /// At least one model votes positive
    #[default]
    Any,
    /// Strictly more than half of the voters (both, with two models)
    Majority,
    /// Every model votes positive
    All,
}

impl DecisionRule {
    /// Parse a rule name, falling back to `Any` for unknown or empty values
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "majority" => DecisionRule::Majority,
            "all" => DecisionRule::All,
            _ => DecisionRule::Any,
        }
    }
}

/// One classified flow row, fanned out to every sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub timestamp: String,
    pub source_file: String,
    /// Absolute 0-based data row index in the source file
    pub flow_index: u64,
    pub rf_prob: f64,
    pub rf_label: String,
    pub xgb_prob: f64,
    pub xgb_label: String,
    pub decision: Decision,
}

impl ClassificationResult {
    /// File name without the directory part, for human-readable alerts
    pub fn file_name(&self) -> String {
        PathBuf::from(&self.source_file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_file.clone())
    }
}

/// Counters reported by the control surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub results_total: u64,
    pub attacks_total: u64,
    pub files_tracked: u64,
}
