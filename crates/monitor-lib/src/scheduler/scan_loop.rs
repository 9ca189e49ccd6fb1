//! Periodic directory scan, on-demand rescans and watcher-driven processing

use super::{FileOutcome, FileProcessor};
use crate::error::ProcessError;
use crate::health::components;
use crate::ingest::{has_extension, list_flow_files};
use crate::observability::MonitorMetrics;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub watch_dir: PathBuf,
    /// Extension without the dot, matched case-insensitively
    pub extension: String,
    /// Sleep between the end of one tick and the start of the next
    pub interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("flows"),
            extension: "csv".to_string(),
            interval: Duration::from_secs(2),
        }
    }
}

/// Per-file line of a scan summary
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    #[serde(flatten)]
    pub outcome: Option<FileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub files: Vec<FileReport>,
}

impl ScanSummary {
    pub fn classified(&self) -> usize {
        self.files
            .iter()
            .filter_map(|f| f.outcome.as_ref())
            .map(FileOutcome::classified)
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }
}

/// Drives [`FileProcessor`] over the watch directory
pub struct ScanScheduler {
    processor: Arc<FileProcessor>,
    config: ScanConfig,
    metrics: MonitorMetrics,
}

impl ScanScheduler {
    pub fn new(processor: Arc<FileProcessor>, config: ScanConfig) -> Self {
        Self {
            processor,
            config,
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<FileProcessor> {
        &self.processor
    }

    /// One pass over every matching file, in sorted path order
    pub async fn scan_once(&self) -> ScanSummary {
        self.scan_until(|| false).await
    }

    /// Rescan one file (relative paths resolve against the watch directory) or everything
    pub async fn rescan(&self, path: Option<&Path>) -> ScanSummary {
        match path {
            None => self.scan_once().await,
            Some(path) => {
                let path = if path.is_relative() {
                    self.config.watch_dir.join(path)
                } else {
                    path.to_path_buf()
                };
                let mut summary = ScanSummary::default();
                if has_extension(&path, &self.config.extension) {
                    summary.files.push(self.process_one(&path).await);
                } else {
                    summary.files.push(FileReport {
                        path: path.to_string_lossy().into_owned(),
                        outcome: None,
                        error: Some(format!("not a .{} file", self.config.extension)),
                    });
                }
                summary
            }
        }
    }

    async fn scan_until(&self, mut should_stop: impl FnMut() -> bool) -> ScanSummary {
        let started = Instant::now();
        let health = self.processor.health();
        let mut summary = ScanSummary::default();

        let files = match list_flow_files(&self.config.watch_dir, &self.config.extension).await {
            Ok(files) => {
                health.set_healthy(components::SCANNER).await;
                files
            }
            Err(e) => {
                warn!(
                    dir = %self.config.watch_dir.display(),
                    error = %e,
                    "Failed to list watch directory"
                );
                health
                    .set_degraded(components::SCANNER, format!("cannot list watch dir: {}", e))
                    .await;
                return summary;
            }
        };

        for path in files {
            if should_stop() {
                info!("Shutdown requested, stopping scan between files");
                break;
            }
            summary.files.push(self.process_one(&path).await);
        }

        if let Ok(tracked) = self.processor.ledger().tracked_files() {
            self.metrics.set_files_tracked(tracked as i64);
        }
        self.metrics
            .observe_scan_latency(started.elapsed().as_secs_f64());
        debug!(
            files = summary.files.len(),
            classified = summary.classified(),
            failed = summary.failed(),
            elapsed_ms = started.elapsed().as_millis(),
            "Scan complete"
        );
        summary
    }

    /// Failures are isolated to the file they happened in
    async fn process_one(&self, path: &Path) -> FileReport {
        let shown = path.to_string_lossy().into_owned();
        match self.processor.process_file(path).await {
            Ok(outcome) => FileReport {
                path: shown,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => {
                match &e {
                    ProcessError::TransientRead(_) => {
                        debug!(path = %shown, "File not stable yet, retrying next tick")
                    }
                    _ => warn!(path = %shown, kind = e.kind(), error = %e, "Failed to process file"),
                }
                FileReport {
                    path: shown,
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Tick loop: scan, then sleep until the next tick or shutdown.
    ///
    /// Shutdown is honoured between files and between ticks, never inside
    /// one file's processing.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            dir = %self.config.watch_dir.display(),
            interval_ms = self.config.interval.as_millis(),
            "Starting scan loop"
        );

        loop {
            let mut stop_requested = false;
            self.scan_until(|| {
                if !stop_requested {
                    stop_requested = !matches!(
                        shutdown.try_recv(),
                        Err(broadcast::error::TryRecvError::Empty)
                    );
                }
                stop_requested
            })
            .await;
            if stop_requested {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        info!("Scan loop stopped");
    }

    /// Process paths reported by the filesystem watcher until shutdown
    pub fn spawn_event_listener(
        self: Arc<Self>,
        mut events: mpsc::Receiver<PathBuf>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(path) if has_extension(&path, &self.config.extension) => {
                            self.process_one(&path).await;
                        }
                        Some(_) => {}
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            debug!("Watcher event listener stopped");
        })
    }
}
