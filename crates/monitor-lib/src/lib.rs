//! Flow monitor library
//!
//! This crate provides the core functionality for:
//! - Incremental ingestion of network-flow CSV captures
//! - Header canonicalisation and row cleaning against a fixed feature schema
//! - Two-model ensemble classification with a configurable decision rule
//! - Fan-out of results to a JSON-lines log, SQLite and a GELF aggregator
//! - Durable per-file progress, health checks and observability

pub mod classifier;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod scheduler;
pub mod store;

pub use control::{ControlSurface, HealthReport};
pub use error::{ClassifyError, ProcessError, StoreError, TransportError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use scheduler::{FileOutcome, FileProcessor, ScanConfig, ScanScheduler, ScanSummary};
pub use store::{ProgressLedger, ResultStore, StateDb};
