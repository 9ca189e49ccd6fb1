//! Operator-facing control operations
//!
//! Transport-neutral: the binary maps these onto HTTP routes.

use crate::error::StoreError;
use crate::health::HealthResponse;
use crate::models::MonitorStats;
use crate::scheduler::{ScanScheduler, ScanSummary};
use crate::store::ResultStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Liveness report: where we watch, where results go, how the pipeline is doing
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub watch_dir: String,
    /// `None` when remote sending is disabled
    pub aggregator: Option<String>,
    #[serde(flatten)]
    pub health: HealthResponse,
}

pub struct ControlSurface {
    scheduler: Arc<ScanScheduler>,
    store: Arc<dyn ResultStore>,
    api_key: String,
}

impl ControlSurface {
    pub fn new(scheduler: Arc<ScanScheduler>, store: Arc<dyn ResultStore>, api_key: String) -> Self {
        Self {
            scheduler,
            store,
            api_key,
        }
    }

    /// Exact match against the configured secret. An empty secret disables
    /// the check; a missing credential counts as the empty string.
    pub fn authorize(&self, provided: Option<&str>) -> bool {
        self.api_key.is_empty() || provided.unwrap_or("") == self.api_key
    }

    pub async fn health(&self) -> HealthReport {
        let processor = self.scheduler.processor();
        let health = processor.health().health().await;
        HealthReport {
            ok: health.status.is_operational(),
            watch_dir: self.scheduler.config().watch_dir.display().to_string(),
            aggregator: processor.dispatcher().remote().describe(),
            health,
        }
    }

    pub fn stats(&self) -> Result<MonitorStats, StoreError> {
        Ok(MonitorStats {
            results_total: self.store.count_results()?,
            attacks_total: self.store.count_attacks()?,
            files_tracked: self.scheduler.processor().ledger().tracked_files()?,
        })
    }

    /// Process one path, or every matching file when `path` is `None`
    pub async fn rescan(&self, path: Option<&Path>) -> ScanSummary {
        info!(path = ?path, "Rescan requested");
        self.scheduler.rescan(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::ColumnScorer;
    use crate::classifier::{BatchOrchestrator, DecisionFuser, OrchestratorConfig};
    use crate::dispatch::{AggregatorConfig, AggregatorSender, FanOutDispatcher, NdjsonLog};
    use crate::health::HealthRegistry;
    use crate::ingest::{ExpectedSchema, RowNormalizer, StabilityConfig, StabilityGate};
    use crate::observability::StructuredLogger;
    use crate::scheduler::{FileProcessor, ScanConfig};
    use crate::store::StateDb;
    use std::time::Duration;
    use tempfile::TempDir;

    fn surface(dir: &TempDir, api_key: &str) -> ControlSurface {
        let db = Arc::new(StateDb::open_in_memory().unwrap());
        let logger = StructuredLogger::new("test-host");
        let processor = FileProcessor::new(
            StabilityGate::new(StabilityConfig {
                checks: 2,
                delay: Duration::from_millis(5),
            }),
            RowNormalizer::new(ExpectedSchema::new(vec!["Flow Duration".into()])),
            BatchOrchestrator::new(
                Arc::new(ColumnScorer::new("rf", 0)),
                Arc::new(ColumnScorer::new("xgb", 0)),
                OrchestratorConfig::default(),
            ),
            DecisionFuser::default(),
            FanOutDispatcher::new(
                NdjsonLog::new(dir.path().join("out.json")),
                db.clone(),
                Arc::new(AggregatorSender::new(AggregatorConfig::default())),
                logger.clone(),
            ),
            db.clone(),
            HealthRegistry::new(),
            logger,
        );
        let scheduler = Arc::new(ScanScheduler::new(
            Arc::new(processor),
            ScanConfig {
                watch_dir: dir.path().to_path_buf(),
                ..ScanConfig::default()
            },
        ));
        ControlSurface::new(scheduler, db, api_key.to_string())
    }

    #[test]
    fn test_authorize_exact_match() {
        let dir = TempDir::new().unwrap();
        let control = surface(&dir, "s3cret");

        assert!(control.authorize(Some("s3cret")));
        assert!(!control.authorize(Some("S3CRET")));
        assert!(!control.authorize(Some("s3cret ")));
        assert!(!control.authorize(None));
    }

    #[test]
    fn test_empty_secret_disables_check() {
        let dir = TempDir::new().unwrap();
        let control = surface(&dir, "");

        assert!(control.authorize(None));
        assert!(control.authorize(Some("anything")));
    }

    #[tokio::test]
    async fn test_stats_after_rescan() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("a.csv"),
            "Flow Duration,Label\n0.9,x\n0.1,x\n0.7,x\n",
        )
        .unwrap();
        let control = surface(&dir, "");

        assert_eq!(control.stats().unwrap(), MonitorStats::default());

        let summary = control.rescan(None).await;
        assert_eq!(summary.classified(), 3);

        let stats = control.stats().unwrap();
        assert_eq!(stats.results_total, 3);
        assert_eq!(stats.attacks_total, 2);
        assert_eq!(stats.files_tracked, 1);
    }

    #[tokio::test]
    async fn test_health_reports_watch_dir_and_disabled_aggregator() {
        let dir = TempDir::new().unwrap();
        let control = surface(&dir, "");

        let report = control.health().await;
        assert!(report.ok);
        assert_eq!(report.watch_dir, dir.path().display().to_string());
        assert!(report.aggregator.is_none());
    }
}
