//! Monitor configuration
//!
//! Values come from a config file overlaid by `FLOWMON_*` environment
//! variables. The file is `FLOWMON_CONFIG` when set (and must exist), else an
//! optional `flow-monitor.{toml,yaml,json,...}` in the working directory.
//! Every field has a default.

use anyhow::{Context, Result};
use monitor_lib::classifier::{FuserConfig, OrchestratorConfig};
use monitor_lib::dispatch::{AggregatorConfig, AggregatorMode, AggregatorTransport};
use monitor_lib::ingest::StabilityConfig;
use monitor_lib::{DecisionRule, ScanConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base name of the optional config file, extension picked by the `config` crate
pub const DEFAULT_CONFIG_FILE: &str = "flow-monitor";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory scanned for flow captures
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// SQLite file holding progress cursors and results
    #[serde(default = "default_state_db")]
    pub state_db: PathBuf,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    #[serde(default = "default_stable_checks")]
    pub stable_checks: u32,

    #[serde(default = "default_stable_delay_ms")]
    pub stable_delay_ms: u64,

    /// Append-only JSON-lines result log
    #[serde(default = "default_ndjson_path")]
    pub ndjson_path: PathBuf,

    /// Empty disables remote sending
    #[serde(default)]
    pub graylog_host: String,

    #[serde(default = "default_graylog_port")]
    pub graylog_port: u16,

    /// `gelf` or `raw`
    #[serde(default = "default_graylog_mode")]
    pub graylog_mode: String,

    /// `udp` or `tcp`
    #[serde(default = "default_graylog_transport")]
    pub graylog_transport: String,

    #[serde(default = "default_graylog_timeout_ms")]
    pub graylog_timeout_ms: u64,

    /// Host name reported in GELF envelopes and logs
    #[serde(default = "default_origin_host")]
    pub origin_host: String,

    /// Shared secret for `/stats` and `/rescan`; empty disables the check
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_threshold")]
    pub threshold_rf: f64,

    #[serde(default = "default_threshold")]
    pub threshold_xgb: f64,

    /// `any`, `majority` or `all`; anything else means `any`
    #[serde(default = "default_ensemble_rule")]
    pub ensemble_rule: String,

    #[serde(default = "default_rf_model_path")]
    pub rf_model_path: PathBuf,

    #[serde(default = "default_xgb_model_path")]
    pub xgb_model_path: PathBuf,

    /// JSON array of feature names; built-in CIC-DDoS2019 list when unset
    #[serde(default)]
    pub features_path: Option<PathBuf>,

    /// Negative then positive class label
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,

    #[serde(default = "default_classify_timeout_ms")]
    pub classify_timeout_ms: u64,

    /// Also react to filesystem events between ticks
    #[serde(default)]
    pub watch_events: bool,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("flows")
}

fn default_file_extension() -> String {
    "csv".to_string()
}

fn default_state_db() -> PathBuf {
    PathBuf::from("state/monitor.sqlite")
}

fn default_batch_size() -> usize {
    500
}

fn default_scan_interval_ms() -> u64 {
    2000
}

fn default_stable_checks() -> u32 {
    3
}

fn default_stable_delay_ms() -> u64 {
    200
}

fn default_ndjson_path() -> PathBuf {
    PathBuf::from("logs/graylog_input.json")
}

fn default_graylog_port() -> u16 {
    12201
}

fn default_graylog_mode() -> String {
    "gelf".to_string()
}

fn default_graylog_transport() -> String {
    "udp".to_string()
}

fn default_graylog_timeout_ms() -> u64 {
    3000
}

fn default_origin_host() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "flow-monitor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_threshold() -> f64 {
    0.50
}

fn default_ensemble_rule() -> String {
    "any".to_string()
}

fn default_rf_model_path() -> PathBuf {
    PathBuf::from("models/rf_model.onnx")
}

fn default_xgb_model_path() -> PathBuf {
    PathBuf::from("models/xgb_model.onnx")
}

fn default_class_names() -> Vec<String> {
    vec!["BENIGN".to_string(), "DrDoS_DNS".to_string()]
}

fn default_classify_timeout_ms() -> u64 {
    30_000
}

impl AppConfig {
    /// Load from `FLOWMON_CONFIG` or `flow-monitor.*`, then the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("FLOWMON_CONFIG").ok().map(PathBuf::from);
        Self::load_from(file.as_deref(), DEFAULT_CONFIG_FILE)
    }

    /// `file` is required when given; otherwise `fallback` is read if it exists
    pub fn load_from(file: Option<&Path>, fallback: &str) -> Result<Self> {
        let source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(fallback).required(false),
        };

        let config = config::Config::builder()
            .add_source(source)
            .add_source(
                config::Environment::with_prefix("FLOWMON")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("class_names"),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration values")
    }

    pub fn stability_config(&self) -> StabilityConfig {
        StabilityConfig {
            checks: self.stable_checks.max(2),
            delay: Duration::from_millis(self.stable_delay_ms),
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            watch_dir: self.watch_dir.clone(),
            extension: self.file_extension.trim_start_matches('.').to_string(),
            interval: Duration::from_millis(self.scan_interval_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            batch_size: self.batch_size.max(1),
            timeout: Duration::from_millis(self.classify_timeout_ms),
        }
    }

    pub fn fuser_config(&self) -> FuserConfig {
        FuserConfig {
            threshold_rf: self.threshold_rf,
            threshold_xgb: self.threshold_xgb,
            rule: DecisionRule::parse_lenient(&self.ensemble_rule),
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            host: self.graylog_host.clone(),
            port: self.graylog_port,
            mode: AggregatorMode::parse_lenient(&self.graylog_mode),
            transport: AggregatorTransport::parse_lenient(&self.graylog_transport),
            timeout: Duration::from_millis(self.graylog_timeout_ms),
            origin_host: self.origin_host.clone(),
        }
    }
}
