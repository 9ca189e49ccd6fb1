//! Per-file processing: stability gate through cursor commit

use crate::classifier::{BatchOrchestrator, DecisionFuser, RowScores};
use crate::dispatch::FanOutDispatcher;
use crate::error::ProcessError;
use crate::health::{components, HealthRegistry};
use crate::ingest::{Normalization, RawTable, RowNormalizer, StabilityGate};
use crate::models::ClassificationResult;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::ProgressLedger;
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

/// What happened to a file on one processing attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Size and mtime match the stored cursor; not read
    Unchanged,
    /// Read, but no rows beyond the cursor
    UpToDate { total_rows: u64 },
    /// Every new row was dropped during cleaning; cursor moved to the end
    Empty {
        start: u64,
        total_rows: u64,
        dropped: usize,
    },
    /// New rows classified, dispatched and committed
    Processed {
        start: u64,
        total_rows: u64,
        classified: usize,
    },
}

impl FileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Unchanged => "unchanged",
            FileOutcome::UpToDate { .. } => "up_to_date",
            FileOutcome::Empty { .. } => "empty",
            FileOutcome::Processed { .. } => "processed",
        }
    }

    pub fn classified(&self) -> usize {
        match self {
            FileOutcome::Processed { classified, .. } => *classified,
            _ => 0,
        }
    }
}

/// Runs the full pipeline for one file at a time per path.
///
/// A per-path async mutex covers everything from the ledger read to the
/// ledger write, so the scan loop, watcher events and external rescans can
/// never advance the same cursor from the same offset twice.
pub struct FileProcessor {
    gate: StabilityGate,
    normalizer: RowNormalizer,
    orchestrator: BatchOrchestrator,
    fuser: DecisionFuser,
    dispatcher: FanOutDispatcher,
    ledger: Arc<dyn ProgressLedger>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FileProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gate: StabilityGate,
        normalizer: RowNormalizer,
        orchestrator: BatchOrchestrator,
        fuser: DecisionFuser,
        dispatcher: FanOutDispatcher,
        ledger: Arc<dyn ProgressLedger>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            gate,
            normalizer,
            orchestrator,
            fuser,
            dispatcher: dispatcher.with_health(health.clone()),
            ledger,
            health,
            logger,
            metrics: MonitorMetrics::new(),
            locks: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn ProgressLedger> {
        &self.ledger
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn dispatcher(&self) -> &FanOutDispatcher {
        &self.dispatcher
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Process the unseen rows of `path`, serialised per path.
    ///
    /// The path is canonicalised first: every spelling of one file shares a
    /// single lock and a single ledger cursor.
    pub async fn process_file(&self, path: &Path) -> Result<FileOutcome, ProcessError> {
        let result = match canonical_path(path).await {
            Ok(path) => {
                let lock = self.lock_for(&path);
                let _guard = lock.lock().await;
                self.process_locked(&path).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(outcome) => {
                self.metrics.inc_file_outcome(outcome.label());
                self.record_recovery(outcome).await;
            }
            Err(e) => {
                self.metrics.inc_file_outcome(e.kind());
                self.health.record_file_error(e).await;
            }
        }
        result
    }

    /// Clear degradations that a successful attempt disproves
    async fn record_recovery(&self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Processed { .. } => {
                self.health.set_healthy(components::CLASSIFIER).await;
                self.health.set_healthy(components::RESULT_STORE).await;
            }
            FileOutcome::Empty { .. } | FileOutcome::UpToDate { .. } => {
                self.health.set_healthy(components::RESULT_STORE).await;
            }
            FileOutcome::Unchanged => {}
        }
    }

    async fn process_locked(&self, path: &Path) -> Result<FileOutcome, ProcessError> {
        if !self.gate.is_stable(path).await {
            return Err(ProcessError::TransientRead(path.to_path_buf()));
        }

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| ProcessError::TransientRead(path.to_path_buf()))?;
        let size = meta.len();
        let mtime = modified_secs(&meta);
        let key = path.to_string_lossy().into_owned();

        let cursor = self.ledger.cursor(&key).map_err(ProcessError::Ledger)?;
        if let Some(c) = &cursor {
            if c.last_size == size && c.last_mtime == mtime {
                debug!(path = %key, rows_done = c.rows_done, "File unchanged since last tick");
                return Ok(FileOutcome::Unchanged);
            }
        }
        let start = cursor.map(|c| c.rows_done).unwrap_or(0);

        let table = read_table(path).await?;
        let total_rows = table.row_count() as u64;

        if start >= total_rows {
            // Nothing new (or the file shrank); remember size and mtime for the fast path
            self.ledger
                .upsert(&key, start, size, mtime)
                .map_err(ProcessError::Ledger)?;
            return Ok(FileOutcome::UpToDate { total_rows });
        }

        let batch = match self.normalizer.normalize(&table, start as usize) {
            Normalization::Empty { dropped } => {
                self.ledger
                    .upsert(&key, total_rows, size, mtime)
                    .map_err(ProcessError::Ledger)?;
                self.metrics.inc_empty_batches();
                self.logger.log_empty_batch(&key, start, total_rows);
                return Ok(FileOutcome::Empty {
                    start,
                    total_rows,
                    dropped,
                });
            }
            Normalization::Rows(batch) => batch,
        };

        if !batch.missing_columns.is_empty() {
            debug!(
                path = %key,
                missing = ?batch.missing_columns,
                "Expected columns absent, filled with 0.0"
            );
        }

        let mut classified = 0;
        for range in self.orchestrator.chunk_ranges(batch.len()) {
            let started = Instant::now();
            let scores = self.orchestrator.score_chunk(&batch, range).await?;
            self.metrics
                .observe_classify_latency(started.elapsed().as_secs_f64());

            let results: Vec<ClassificationResult> =
                scores.into_iter().map(|s| self.to_result(&key, s)).collect();
            self.dispatcher
                .dispatch_all(&results)
                .await
                .map_err(ProcessError::Store)?;

            self.metrics.inc_rows_classified(results.len() as u64);
            classified += results.len();
        }

        self.ledger
            .upsert(&key, total_rows, size, mtime)
            .map_err(ProcessError::Ledger)?;
        self.logger
            .log_file_processed(&key, start, total_rows, classified);

        Ok(FileOutcome::Processed {
            start,
            total_rows,
            classified,
        })
    }

    fn to_result(&self, source_file: &str, scores: RowScores) -> ClassificationResult {
        let decision = self
            .fuser
            .decide(scores.rf.probability, scores.xgb.probability);
        ClassificationResult {
            timestamp: chrono::Utc::now().to_rfc3339(),
            source_file: source_file.to_string(),
            flow_index: scores.flow_index,
            rf_prob: scores.rf.probability,
            rf_label: scores.rf.label,
            xgb_prob: scores.xgb.probability,
            xgb_label: scores.xgb.label,
            decision,
        }
    }
}

async fn canonical_path(path: &Path) -> Result<PathBuf, ProcessError> {
    tokio::fs::canonicalize(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessError::TransientRead(path.to_path_buf())
        } else {
            ProcessError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        }
    })
}

async fn read_table(path: &Path) -> Result<RawTable, ProcessError> {
    let owned = path.to_path_buf();
    let parse_error = |message: String| ProcessError::Parse {
        path: path.to_path_buf(),
        message,
    };

    tokio::task::spawn_blocking(move || RawTable::from_path(&owned))
        .await
        .map_err(|e| parse_error(e.to_string()))?
        .map_err(|e| match e.kind() {
            csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                ProcessError::TransientRead(path.to_path_buf())
            }
            _ => parse_error(e.to_string()),
        })
}

fn modified_secs(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
