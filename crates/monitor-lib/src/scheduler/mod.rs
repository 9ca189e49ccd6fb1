//! Scan scheduling
//!
//! [`FileProcessor`] owns the per-file pipeline (stability gate, read,
//! normalise, classify, fan-out, cursor commit). [`ScanScheduler`] decides
//! when it runs: on a fixed tick, on demand, or on filesystem events.

mod processor;
mod scan_loop;


pub use processor::{FileOutcome, FileProcessor};
pub use scan_loop::{FileReport, ScanConfig, ScanScheduler, ScanSummary};
