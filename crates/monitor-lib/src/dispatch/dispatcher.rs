//! Ordered delivery of results to the log, store and aggregator

use super::{NdjsonLog, RemoteSink};
use crate::error::StoreError;
use crate::health::{components, HealthRegistry};
use crate::models::ClassificationResult;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::ResultStore;
use std::sync::Arc;
use tracing::warn;

/// Fans each result out to every sink.
///
/// Log and aggregator failures are logged, counted and swallowed. A store
/// failure is reported to the caller only after the remaining sinks were
/// attempted, so the caller can hold back the progress cursor.
pub struct FanOutDispatcher {
    log: NdjsonLog,
    store: Arc<dyn ResultStore>,
    remote: Arc<dyn RemoteSink>,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
    health: HealthRegistry,
}

impl FanOutDispatcher {
    pub fn new(
        log: NdjsonLog,
        store: Arc<dyn ResultStore>,
        remote: Arc<dyn RemoteSink>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            log,
            store,
            remote,
            logger,
            metrics: MonitorMetrics::new(),
            health: HealthRegistry::new(),
        }
    }

    /// Report aggregator delivery into `health` instead of a private registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn remote(&self) -> &Arc<dyn RemoteSink> {
        &self.remote
    }

    /// Deliver one result; returns the store id on success
    pub async fn dispatch(&self, result: &ClassificationResult) -> Result<i64, StoreError> {
        if result.decision.is_attack() {
            self.logger.log_attack(result);
            self.metrics.inc_attacks_detected();
        }

        if let Err(e) = self.log.append(result) {
            self.metrics.inc_dispatch_failure("log");
            warn!(error = %e, path = %self.log.path().display(), "Failed to append result to log");
        }

        let stored = self.store.insert(result);
        if let Err(e) = &stored {
            self.metrics.inc_dispatch_failure("store");
            warn!(
                error = %e,
                source_file = %result.source_file,
                flow_index = result.flow_index,
                "Failed to persist result"
            );
        }

        match self.remote.send(result).await {
            Ok(()) => self.health.set_healthy(components::AGGREGATOR).await,
            Err(e) => {
                self.metrics.inc_dispatch_failure("aggregator");
                warn!(error = %e, flow_index = result.flow_index, "Failed to send result to aggregator");
                self.health
                    .set_degraded(components::AGGREGATOR, format!("send failed: {}", e))
                    .await;
            }
        }

        stored
    }

    /// Deliver every result in order.
    ///
    /// Keeps going after a store failure and returns the first one at the end.
    pub async fn dispatch_all(&self, results: &[ClassificationResult]) -> Result<usize, StoreError> {
        let mut first_error = None;
        for result in results {
            if let Err(e) = self.dispatch(result).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{BrokenStore, RecordingRemote, UnreachableRemote};
    use crate::health::ComponentStatus;
    use crate::models::Decision;
    use crate::store::StateDb;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn result(flow_index: u64, decision: Decision) -> ClassificationResult {
        ClassificationResult {
            timestamp: "2024-05-01T12:00:00+00:00".to_string(),
            source_file: "/flows/a.csv".to_string(),
            flow_index,
            rf_prob: 0.9,
            rf_label: "DrDoS_DNS".to_string(),
            xgb_prob: 0.2,
            xgb_label: "BENIGN".to_string(),
            decision,
        }
    }

    fn log_lines(dir: &TempDir) -> usize {
        std::fs::read_to_string(dir.path().join("out.json"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_every_sink_receives_result() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StateDb::open_in_memory().unwrap());
        let remote = Arc::new(RecordingRemote::default());
        let dispatcher = FanOutDispatcher::new(
            NdjsonLog::new(dir.path().join("out.json")),
            store.clone(),
            remote.clone(),
            StructuredLogger::new("test"),
        );

        let batch = vec![result(0, Decision::Attack), result(1, Decision::Benign)];
        assert_eq!(dispatcher.dispatch_all(&batch).await.unwrap(), 2);

        assert_eq!(log_lines(&dir), 2);
        assert_eq!(store.count_results().unwrap(), 2);
        assert_eq!(store.count_attacks().unwrap(), 1);
        let sent = remote.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].flow_index, 0);
        assert_eq!(sent[1].flow_index, 1);
    }

    #[tokio::test]
    async fn test_remote_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StateDb::open_in_memory().unwrap());
        let remote = Arc::new(UnreachableRemote::default());
        let dispatcher = FanOutDispatcher::new(
            NdjsonLog::new(dir.path().join("out.json")),
            store.clone(),
            remote.clone(),
            StructuredLogger::new("test"),
        );

        let batch = vec![result(0, Decision::Benign), result(1, Decision::Benign)];
        assert_eq!(dispatcher.dispatch_all(&batch).await.unwrap(), 2);

        assert_eq!(remote.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.count_results().unwrap(), 2);
        assert_eq!(log_lines(&dir), 2);
    }

    #[tokio::test]
    async fn test_aggregator_health_follows_send_results() {
        let dir = TempDir::new().unwrap();
        let health = HealthRegistry::with_pipeline_components().await;
        let store = Arc::new(StateDb::open_in_memory().unwrap());

        let failing = FanOutDispatcher::new(
            NdjsonLog::new(dir.path().join("out.json")),
            store.clone(),
            Arc::new(UnreachableRemote::default()),
            StructuredLogger::new("test"),
        )
        .with_health(health.clone());
        failing.dispatch(&result(0, Decision::Benign)).await.unwrap();

        let report = health.health().await;
        assert_eq!(
            report.components[components::AGGREGATOR].status,
            ComponentStatus::Degraded
        );

        let working = FanOutDispatcher::new(
            NdjsonLog::new(dir.path().join("out.json")),
            store,
            Arc::new(RecordingRemote::default()),
            StructuredLogger::new("test"),
        )
        .with_health(health.clone());
        working.dispatch(&result(1, Decision::Benign)).await.unwrap();

        let report = health.health().await;
        assert_eq!(
            report.components[components::AGGREGATOR].status,
            ComponentStatus::Healthy
        );
        assert_eq!(report.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_log_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        // A directory where the log file should be makes every append fail
        let log_path = dir.path().join("out.json");
        std::fs::create_dir(&log_path).unwrap();

        let store = Arc::new(StateDb::open_in_memory().unwrap());
        let dispatcher = FanOutDispatcher::new(
            NdjsonLog::new(log_path),
            store.clone(),
            Arc::new(RecordingRemote::default()),
            StructuredLogger::new("test"),
        );

        dispatcher.dispatch(&result(0, Decision::Benign)).await.unwrap();
        assert_eq!(store.count_results().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_reported_after_other_sinks() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(BrokenStore::default());
        let remote = Arc::new(RecordingRemote::default());
        let dispatcher = FanOutDispatcher::new(
            NdjsonLog::new(dir.path().join("out.json")),
            store.clone(),
            remote.clone(),
            StructuredLogger::new("test"),
        );

        let batch = vec![result(0, Decision::Attack), result(1, Decision::Benign)];
        assert!(dispatcher.dispatch_all(&batch).await.is_err());

        // Every result still reached the best-effort sinks
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(remote.sent().len(), 2);
        assert_eq!(log_lines(&dir), 2);
    }
}
