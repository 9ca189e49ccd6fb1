//! Flow classification
//!
//! The two trained models are treated as interchangeable instances of one
//! capability, [`Scorer`]. The orchestrator slices a normalised batch into
//! chunks and asks every scorer for per-row probabilities and labels; the
//! fuser turns the probabilities into a single ATTACK/BENIGN verdict.

mod fuser;
mod onnx;
mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use fuser::{DecisionFuser, FuserConfig};
pub use onnx::{OnnxScorer, DEFAULT_CLASS_NAMES};
pub use orchestrator::{
    BatchOrchestrator, ModelVerdict, OrchestratorConfig, RowScores, DEFAULT_BATCH_SIZE,
    DEFAULT_CLASSIFY_TIMEOUT,
};

use crate::error::ClassifyError;

/// Per-model output for a matrix of feature rows
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScores {
    /// Probability of the positive (attack) class, one per input row
    pub probabilities: Vec<f64>,
    /// Predicted class label, one per input row
    pub labels: Vec<String>,
}

/// A trained binary classifier
pub trait Scorer: Send + Sync {
    /// Model name used in logs and errors
    fn name(&self) -> &str;

    /// Score every row; outputs keep the input order and length
    fn score(&self, rows: &[Vec<f64>]) -> Result<ModelScores, ClassifyError>;
}
