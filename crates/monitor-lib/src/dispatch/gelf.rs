//! Remote log aggregator sender (GELF 1.1 or raw JSON over UDP/TCP)

use super::RemoteSink;
use crate::error::TransportError;
use crate::models::ClassificationResult;
use async_trait::async_trait;
use serde::Serialize;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

pub const DEFAULT_AGGREGATOR_PORT: u16 = 12201;
pub const DEFAULT_AGGREGATOR_TIMEOUT: Duration = Duration::from_secs(3);

const FACILITY: &str = "ml-monitor";
/// Syslog "notice"
const GELF_LEVEL: u8 = 5;

/// Payload format sent to the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregatorMode {
    /// GELF 1.1 envelope with underscore-prefixed custom fields
    #[default]
    Gelf,
    /// The result record as plain JSON
    Raw,
}

impl AggregatorMode {
    /// Anything other than `gelf` is treated as raw
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("gelf") {
            AggregatorMode::Gelf
        } else {
            AggregatorMode::Raw
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregatorTransport {
    #[default]
    Udp,
    /// One connection per message, frame terminated by a NUL byte
    Tcp,
}

impl AggregatorTransport {
    /// Anything other than `tcp` falls back to UDP
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("tcp") {
            AggregatorTransport::Tcp
        } else {
            AggregatorTransport::Udp
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Empty host disables sending entirely
    pub host: String,
    pub port: u16,
    pub mode: AggregatorMode,
    pub transport: AggregatorTransport,
    pub timeout: Duration,
    /// Value of the GELF `host` field
    pub origin_host: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_AGGREGATOR_PORT,
            mode: AggregatorMode::Gelf,
            transport: AggregatorTransport::Udp,
            timeout: DEFAULT_AGGREGATOR_TIMEOUT,
            origin_host: "flow-monitor".to_string(),
        }
    }
}

/// GELF 1.1 envelope for one classified flow
#[derive(Debug, Serialize)]
pub struct GelfMessage<'a> {
    version: &'static str,
    host: &'a str,
    short_message: String,
    timestamp: f64,
    level: u8,
    facility: &'static str,
    #[serde(rename = "_rf_prob")]
    rf_prob: f64,
    #[serde(rename = "_xgb_prob")]
    xgb_prob: f64,
    #[serde(rename = "_rf_label")]
    rf_label: &'a str,
    #[serde(rename = "_xgb_label")]
    xgb_label: &'a str,
    #[serde(rename = "_decision")]
    decision: &'static str,
    #[serde(rename = "_source_file")]
    source_file: &'a str,
    #[serde(rename = "_flow_index")]
    flow_index: u64,
    #[serde(rename = "_ts")]
    ts: &'a str,
    #[serde(rename = "_source")]
    source: &'static str,
}

impl<'a> GelfMessage<'a> {
    pub fn from_result(result: &'a ClassificationResult, origin_host: &'a str) -> Self {
        let now = chrono::Utc::now();
        Self {
            version: "1.1",
            host: origin_host,
            short_message: format!("{} DNS flow", result.decision),
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
            level: GELF_LEVEL,
            facility: FACILITY,
            rf_prob: result.rf_prob,
            xgb_prob: result.xgb_prob,
            rf_label: &result.rf_label,
            xgb_label: &result.xgb_label,
            decision: result.decision.as_str(),
            source_file: &result.source_file,
            flow_index: result.flow_index,
            ts: &result.timestamp,
            source: FACILITY,
        }
    }
}

/// Best-effort sender to a Graylog-style aggregator
pub struct AggregatorSender {
    config: AggregatorConfig,
}

impl AggregatorSender {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.host.trim().is_empty() && self.config.port != 0
    }

    /// `host:port/transport`, or `None` when disabled
    pub fn target(&self) -> Option<String> {
        self.is_enabled().then(|| {
            let transport = match self.config.transport {
                AggregatorTransport::Udp => "udp",
                AggregatorTransport::Tcp => "tcp",
            };
            format!("{}:{}/{}", self.config.host.trim(), self.config.port, transport)
        })
    }

    /// Wire bytes for one result, including the TCP frame terminator
    pub fn encode(&self, result: &ClassificationResult) -> Result<Vec<u8>, TransportError> {
        let mut payload = match self.config.mode {
            AggregatorMode::Gelf => {
                serde_json::to_vec(&GelfMessage::from_result(result, &self.config.origin_host))?
            }
            AggregatorMode::Raw => serde_json::to_vec(result)?,
        };

        if self.config.transport == AggregatorTransport::Tcp {
            payload.push(0);
        }
        Ok(payload)
    }

    async fn deliver(&self, payload: &[u8]) -> Result<(), TransportError> {
        let addr = tokio::net::lookup_host((self.config.host.trim(), self.config.port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {}", self.config.host),
                )
            })?;

        match self.config.transport {
            AggregatorTransport::Udp => {
                let bind: SocketAddr = if addr.is_ipv4() {
                    (Ipv4Addr::UNSPECIFIED, 0).into()
                } else {
                    (Ipv6Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(bind).await?;
                socket.send_to(payload, addr).await?;
            }
            AggregatorTransport::Tcp => {
                let mut stream = TcpStream::connect(addr).await?;
                stream.write_all(payload).await?;
                stream.shutdown().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSink for AggregatorSender {
    async fn send(&self, result: &ClassificationResult) -> Result<(), TransportError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let payload = self.encode(result)?;
        tokio::time::timeout(self.config.timeout, self.deliver(&payload))
            .await
            .map_err(|_| TransportError::Timeout(self.config.timeout))??;

        debug!(
            target_addr = %self.config.host,
            port = self.config.port,
            bytes = payload.len(),
            "Sent result to aggregator"
        );
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        self.target()
    }
}
