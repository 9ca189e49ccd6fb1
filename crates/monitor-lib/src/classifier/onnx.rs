//! ONNX model scoring using tract
//!
//! Each exported classifier takes one `[1, width]` float row and produces a
//! probability tensor of shape `[1, 2]` (negative, positive) or `[1, 1]`
//! (positive only). Models exported with a label output alongside the
//! probabilities are fine; non-float outputs are ignored.

use super::{ModelScores, Scorer};
use crate::error::ClassifyError;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Labels used when none are configured: index 0 is negative, index 1 positive
pub const DEFAULT_CLASS_NAMES: [&str; 2] = ["BENIGN", "DrDoS_DNS"];

/// Per-row latency above which a warning is logged
const SLOW_ROW_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Binary classifier backed by a tract-optimised ONNX plan
pub struct OnnxScorer {
    name: String,
    model: TractModel,
    width: usize,
    threshold: f64,
    class_names: [String; 2],
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl OnnxScorer {
    /// Load a model file; `width` is the expected feature count
    pub fn load(
        name: &str,
        path: &Path,
        width: usize,
        threshold: f64,
        class_names: &[String],
    ) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        let scorer = Self::from_bytes(name, &bytes, width, threshold, class_names)?;
        info!(model = name, path = %path.display(), width, threshold, "Loaded ONNX model");
        Ok(scorer)
    }

    pub fn from_bytes(
        name: &str,
        model_bytes: &[u8],
        width: usize,
        threshold: f64,
        class_names: &[String],
    ) -> Result<Self> {
        let model = Self::load_model(model_bytes, width)
            .with_context(|| format!("Failed to prepare model {}", name))?;
        Ok(Self {
            name: name.to_string(),
            model,
            width,
            threshold,
            class_names: class_pair(class_names),
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    fn load_model(model_bytes: &[u8], width: usize) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, width]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    /// Total rows scored and rows that exceeded the latency target
    pub fn stats(&self) -> (u64, u64) {
        (
            self.inference_count.load(Ordering::Relaxed),
            self.slow_inference_count.load(Ordering::Relaxed),
        )
    }

    fn inference_error(&self, message: impl ToString) -> ClassifyError {
        ClassifyError::Inference {
            model: self.name.clone(),
            message: message.to_string(),
        }
    }

    fn score_row(&self, row: &[f64]) -> Result<f64, ClassifyError> {
        if row.len() != self.width {
            return Err(self.inference_error(format!(
                "row has {} features, model expects {}",
                row.len(),
                self.width
            )));
        }

        let start = Instant::now();
        let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.width), data)
            .map_err(|e| self.inference_error(e))?
            .into();

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| self.inference_error(e))?;
        let probability = positive_probability(outputs.iter().map(|v| &**v))
            .ok_or_else(|| self.inference_error("no float probability output"))?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > SLOW_ROW_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(model = %self.name, elapsed_ms = elapsed.as_millis(), "Slow inference");
        }

        Ok(probability)
    }
}

impl Scorer for OnnxScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, rows: &[Vec<f64>]) -> Result<ModelScores, ClassifyError> {
        let start = Instant::now();
        let mut probabilities = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());

        for row in rows {
            let p = self.score_row(row)?;
            labels.push(label_for(p, self.threshold, &self.class_names).to_string());
            probabilities.push(p);
        }

        debug!(
            model = %self.name,
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Scored chunk"
        );
        Ok(ModelScores {
            probabilities,
            labels,
        })
    }
}

/// Positive-class probability from a model's outputs.
///
/// The last float output wins, since probability tensors follow the label
/// tensor in exported classifiers.
fn positive_probability<'a>(outputs: impl IntoIterator<Item = &'a Tensor>) -> Option<f64> {
    outputs
        .into_iter()
        .filter(|t| t.datum_type() == f32::datum_type())
        .filter_map(|t| {
            let values = t.as_slice::<f32>().ok()?;
            match values.len() {
                1 => Some(values[0]),
                2 => Some(values[1]),
                _ => None,
            }
        })
        .last()
        .map(|p| p as f64)
}

fn label_for(probability: f64, threshold: f64, class_names: &[String; 2]) -> &str {
    if probability >= threshold {
        &class_names[1]
    } else {
        &class_names[0]
    }
}

fn class_pair(names: &[String]) -> [String; 2] {
    match names {
        [negative, positive, ..] => [negative.clone(), positive.clone()],
        _ => DEFAULT_CLASS_NAMES.map(String::from),
    }
}
