//! Flow Monitor - network-flow classification service
//!
//! Watches a directory of flow CSV captures, classifies new rows with a
//! two-model ensemble and fans results out to a JSON-lines log, SQLite and
//! an optional GELF aggregator.

use anyhow::{Context, Result};
use monitor_lib::{
    classifier::{BatchOrchestrator, DecisionFuser, OnnxScorer},
    dispatch::{AggregatorSender, FanOutDispatcher, NdjsonLog},
    ingest::{DirectoryWatcher, ExpectedSchema, RowNormalizer, StabilityGate},
    ControlSurface, FileProcessor, HealthRegistry, MonitorMetrics, ScanScheduler, StateDb,
    StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting flow-monitor");

    let mut config = config::AppConfig::load()?;
    info!(
        watch_dir = %config.watch_dir.display(),
        state_db = %config.state_db.display(),
        "Monitor configured"
    );

    let health_registry = HealthRegistry::with_pipeline_components().await;
    let _metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(config.origin_host.clone());

    tokio::fs::create_dir_all(&config.watch_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.watch_dir.display()))?;
    // Ledger keys are canonical paths; scan with the same spelling
    config.watch_dir = tokio::fs::canonicalize(&config.watch_dir)
        .await
        .with_context(|| format!("Failed to resolve {}", config.watch_dir.display()))?;

    let db = Arc::new(StateDb::open(&config.state_db).context("Failed to open state database")?);

    let schema = match &config.features_path {
        Some(path) => ExpectedSchema::from_json_file(path)?,
        None => ExpectedSchema::cic_ddos2019(),
    };
    let width = schema.width();
    logger.log_startup(
        MONITOR_VERSION,
        &config.watch_dir.display().to_string(),
        width,
    );

    let rf = OnnxScorer::load(
        "rf",
        &config.rf_model_path,
        width,
        config.threshold_rf,
        &config.class_names,
    )?;
    let xgb = OnnxScorer::load(
        "xgb",
        &config.xgb_model_path,
        width,
        config.threshold_xgb,
        &config.class_names,
    )?;
    let orchestrator =
        BatchOrchestrator::new(Arc::new(rf), Arc::new(xgb), config.orchestrator_config());

    let aggregator = AggregatorSender::new(config.aggregator_config());
    match aggregator.target() {
        Some(target) => info!(target = %target, "Aggregator output enabled"),
        None => info!("Aggregator output disabled"),
    }

    let dispatcher = FanOutDispatcher::new(
        NdjsonLog::new(&config.ndjson_path),
        db.clone(),
        Arc::new(aggregator),
        logger.clone(),
    );

    let processor = FileProcessor::new(
        StabilityGate::new(config.stability_config()),
        RowNormalizer::new(schema),
        orchestrator,
        DecisionFuser::new(config.fuser_config()),
        dispatcher,
        db.clone(),
        health_registry.clone(),
        logger.clone(),
    );
    let scheduler = Arc::new(ScanScheduler::new(
        Arc::new(processor),
        config.scan_config(),
    ));
    let control = Arc::new(ControlSurface::new(
        scheduler.clone(),
        db.clone(),
        config.api_key.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scan_handle = tokio::spawn(scheduler.clone().run(shutdown_tx.subscribe()));

    // Filesystem events only shorten latency; the tick loop stays authoritative.
    let mut _watcher = None;
    let mut listener_handle = None;
    if config.watch_events {
        let (event_tx, event_rx) = mpsc::channel(256);
        let scan = config.scan_config();
        match DirectoryWatcher::new(&scan.watch_dir, &scan.extension, event_tx).start() {
            Ok(handle) => {
                _watcher = Some(handle);
                listener_handle = Some(
                    scheduler
                        .clone()
                        .spawn_event_listener(event_rx, shutdown_tx.subscribe()),
                );
            }
            Err(e) => warn!(error = %e, "Filesystem watcher unavailable, relying on polling"),
        }
    }

    let app_state = Arc::new(api::AppState::new(control, health_registry.clone()));
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Err(e) = scan_handle.await {
        warn!(error = %e, "Scan loop task failed");
    }
    if let Some(handle) = listener_handle {
        let _ = handle.await;
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
