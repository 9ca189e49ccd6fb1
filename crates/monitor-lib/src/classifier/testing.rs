//! Deterministic scorers for unit tests

use super::{ModelScores, Scorer};
use crate::error::ClassifyError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Uses one feature column, clamped to [0, 1], as the probability
pub struct ColumnScorer {
    pub name: String,
    pub column: usize,
    pub threshold: f64,
    pub calls: AtomicUsize,
}

impl ColumnScorer {
    pub fn new(name: &str, column: usize) -> Self {
        Self {
            name: name.to_string(),
            column,
            threshold: 0.5,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Scorer for ColumnScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, rows: &[Vec<f64>]) -> Result<ModelScores, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let probabilities: Vec<f64> = rows
            .iter()
            .map(|r| r.get(self.column).copied().unwrap_or(0.0).clamp(0.0, 1.0))
            .collect();
        let labels = probabilities
            .iter()
            .map(|p| {
                if *p >= self.threshold {
                    "DrDoS_DNS".to_string()
                } else {
                    "BENIGN".to_string()
                }
            })
            .collect();
        Ok(ModelScores {
            probabilities,
            labels,
        })
    }
}

/// How a [`FaultyScorer`] misbehaves once triggered
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Error,
    ShortOutput,
    Sleep(Duration),
}

/// Behaves like a constant scorer until call number `fail_on_call` (1-based)
pub struct FaultyScorer {
    pub fault: Fault,
    pub fail_on_call: usize,
    pub calls: AtomicUsize,
}

impl FaultyScorer {
    pub fn new(fault: Fault, fail_on_call: usize) -> Self {
        Self {
            fault,
            fail_on_call,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Scorer for FaultyScorer {
    fn name(&self) -> &str {
        "faulty"
    }

    fn score(&self, rows: &[Vec<f64>]) -> Result<ModelScores, ClassifyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut len = rows.len();
        if call >= self.fail_on_call {
            match self.fault {
                Fault::Error => {
                    return Err(ClassifyError::Inference {
                        model: "faulty".to_string(),
                        message: "injected failure".to_string(),
                    })
                }
                Fault::ShortOutput => len = len.saturating_sub(1),
                Fault::Sleep(d) => std::thread::sleep(d),
            }
        }
        Ok(ModelScores {
            probabilities: vec![0.1; len],
            labels: vec!["BENIGN".to_string(); len],
        })
    }
}
