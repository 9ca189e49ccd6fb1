//! Chunked scoring of normalised batches

use super::{ModelScores, Scorer};
use crate::error::ClassifyError;
use crate::ingest::NormalizedBatch;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Maximum rows per scoring call (values below 1 are treated as 1)
    pub batch_size: usize,
    /// Upper bound on a single model call
    pub timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }
}

/// One model's answer for one row
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub probability: f64,
    pub label: String,
}

/// Both model answers for one row, keyed by its absolute file index
#[derive(Debug, Clone, PartialEq)]
pub struct RowScores {
    pub flow_index: u64,
    pub rf: ModelVerdict,
    pub xgb: ModelVerdict,
}

/// Drives the ensemble over a batch in fixed-size chunks
pub struct BatchOrchestrator {
    /// Random forest first, gradient boosting second
    scorers: [Arc<dyn Scorer>; 2],
    config: OrchestratorConfig,
}

impl BatchOrchestrator {
    pub fn new(rf: Arc<dyn Scorer>, xgb: Arc<dyn Scorer>, config: OrchestratorConfig) -> Self {
        Self {
            scorers: [rf, xgb],
            config,
        }
    }

    /// Scorer names in ensemble order
    pub fn model_names(&self) -> [&str; 2] {
        self.scorers.each_ref().map(|scorer| scorer.name())
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Half-open chunk ranges covering `0..len`
    pub fn chunk_ranges(&self, len: usize) -> Vec<Range<usize>> {
        let size = self.config.batch_size.max(1);
        (0..len)
            .step_by(size)
            .map(|start| start..(start + size).min(len))
            .collect()
    }

    /// Score rows `range` of `batch` with every model.
    ///
    /// All calls run concurrently on the blocking pool. Any failure,
    /// timeout or row-count mismatch fails the whole chunk.
    pub async fn score_chunk(
        &self,
        batch: &NormalizedBatch,
        range: Range<usize>,
    ) -> Result<Vec<RowScores>, ClassifyError> {
        let start = Instant::now();
        let rows = Arc::new(batch.rows[range.clone()].to_vec());
        let expected = rows.len();

        let [rf, xgb] = self
            .scorers
            .each_ref()
            .map(|scorer| self.run_scorer(scorer, rows.clone()));
        let (rf, xgb) = tokio::try_join!(rf, xgb)?;

        let scores: Vec<RowScores> = batch.flow_indices[range]
            .iter()
            .zip(verdicts(rf))
            .zip(verdicts(xgb))
            .map(|((flow_index, rf), xgb)| RowScores {
                flow_index: *flow_index,
                rf,
                xgb,
            })
            .collect();

        debug!(
            rows = expected,
            elapsed_ms = start.elapsed().as_millis(),
            "Chunk classified"
        );
        Ok(scores)
    }

    /// Score a whole batch chunk by chunk
    pub async fn classify(&self, batch: &NormalizedBatch) -> Result<Vec<RowScores>, ClassifyError> {
        let mut all = Vec::with_capacity(batch.len());
        for range in self.chunk_ranges(batch.len()) {
            all.extend(self.score_chunk(batch, range).await?);
        }
        Ok(all)
    }

    async fn run_scorer(
        &self,
        scorer: &Arc<dyn Scorer>,
        rows: Arc<Vec<Vec<f64>>>,
    ) -> Result<ModelScores, ClassifyError> {
        let model = scorer.name().to_string();
        let expected = rows.len();
        let task_scorer = scorer.clone();
        let task = tokio::task::spawn_blocking(move || task_scorer.score(&rows));

        let scores = match tokio::time::timeout(self.config.timeout, task).await {
            Err(_) => {
                return Err(ClassifyError::Timeout {
                    model,
                    timeout: self.config.timeout,
                })
            }
            Ok(Err(_)) => return Err(ClassifyError::Join { model }),
            Ok(Ok(result)) => result?,
        };

        let got = scores.probabilities.len().min(scores.labels.len());
        if scores.probabilities.len() != expected || scores.labels.len() != expected {
            return Err(ClassifyError::ShapeMismatch {
                model,
                expected,
                got,
            });
        }
        Ok(scores)
    }
}

fn verdicts(scores: ModelScores) -> impl Iterator<Item = ModelVerdict> {
    scores
        .probabilities
        .into_iter()
        .zip(scores.labels)
        .map(|(probability, label)| ModelVerdict { probability, label })
}
