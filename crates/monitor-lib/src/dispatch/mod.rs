//! Result fan-out
//!
//! Every classification result goes to three sinks in order: the local
//! JSON-lines log, the canonical result store and the remote aggregator.
//! Only the store is authoritative; the other two are best-effort.

mod dispatcher;
mod gelf;
mod ndjson;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::FanOutDispatcher;
pub use gelf::{
    AggregatorConfig, AggregatorMode, AggregatorSender, AggregatorTransport, GelfMessage,
    DEFAULT_AGGREGATOR_PORT, DEFAULT_AGGREGATOR_TIMEOUT,
};
pub use ndjson::NdjsonLog;

use crate::error::TransportError;
use crate::models::ClassificationResult;
use async_trait::async_trait;

/// Best-effort remote destination for results
#[async_trait]
pub trait RemoteSink: Send + Sync {
    async fn send(&self, result: &ClassificationResult) -> Result<(), TransportError>;

    /// Human-readable target for health output, `None` when disabled
    fn describe(&self) -> Option<String>;
}
