//! HTTP client for the Marantz receiver web control interface.
//!
//! Two calls are used:
//! - a form-urlencoded POST of `cmd0..cmdN` fields to [`CONTROL_PATH`]
//!   executes a batch of commands;
//! - a GET of [`STATUS_PATH`] returns the main zone status as XML.
//!
//! # Example
//!
//! ```no_run
//! use avrcontrol::{ReceiverClient, ReceiverCommand, ReceiverEndpoint, ReceiverTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ReceiverClient::new()?;
//!     let endpoint = ReceiverEndpoint::new("192.168.1.20", 80);
//!
//!     let state = client.device_state(&endpoint).await?;
//!     println!("Current attenuation: {}", state.volume);
//!
//!     client
//!         .send_commands(&endpoint, &[ReceiverCommand::PowerOff, ReceiverCommand::RefreshStatus])
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::command::{ReceiverCommand, form_fields};
use crate::errors::TransportError;
use crate::model::DeviceState;

/// Command endpoint of the main zone
pub const CONTROL_PATH: &str = "/MainZone/index.put.asp";

/// Main zone status document
pub const STATUS_PATH: &str = "/goform/formMainZone_MainZoneXml.xml";

/// Default timeout for receiver requests (5 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "AVRSkill/0.1 (avrcontrol)";

/// Literal left in front of some status bodies; removed before parsing.
const BODY_ARTIFACT: &str = "undefined";

/// Network address of the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverEndpoint {
    pub host: String,
    pub port: u16,
}

impl ReceiverEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `http://host:port`, bracketing IPv6 literals.
    pub fn base_url(&self) -> Result<String, TransportError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint(
                "receiver host is empty".to_string(),
            ));
        }
        if host.contains(':') && !host.starts_with('[') {
            Ok(format!("http://[{}]:{}", host, self.port))
        } else {
            Ok(format!("http://{}:{}", host, self.port))
        }
    }
}

/// Write and read paths of the receiver protocol.
///
/// Implemented by [`ReceiverClient`] over HTTP; tests substitute doubles.
#[async_trait]
pub trait ReceiverTransport: Send + Sync {
    /// Executes `commands` in order as a single batch.
    ///
    /// Resolves only once the receiver's response has been fully read.
    async fn send_commands(
        &self,
        endpoint: &ReceiverEndpoint,
        commands: &[ReceiverCommand],
    ) -> Result<(), TransportError>;

    /// Reads the current main zone state.
    async fn device_state(&self, endpoint: &ReceiverEndpoint) -> Result<DeviceState, TransportError>;
}

/// Receiver HTTP client
///
/// Holds a pooled `reqwest::Client`; build it once and share it.
#[derive(Debug, Clone)]
pub struct ReceiverClient {
    client: Client,
    timeout: Duration,
}

impl ReceiverClient {
    /// Create a new client with default settings
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Per-request timeout applied to both paths
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request_error(&self, url: &str, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Connect(url.to_string(), err.to_string())
        }
    }

    fn body_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Body(err.to_string())
        }
    }

    /// Sends a request and drains its body; non-2xx statuses are errors.
    async fn drain(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, TransportError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.body_error(e))?;

        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Receiver answered with an error status");
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ReceiverTransport for ReceiverClient {
    async fn send_commands(
        &self,
        endpoint: &ReceiverEndpoint,
        commands: &[ReceiverCommand],
    ) -> Result<(), TransportError> {
        let url = format!("{}{}", endpoint.base_url()?, CONTROL_PATH);
        let fields = form_fields(commands);
        debug!(url = %url, fields = ?fields, "Posting receiver commands");

        let body = self.drain(&url, self.client.post(&url).form(&fields)).await?;

        debug!(url = %url, bytes = body.len(), "Receiver command batch complete");
        Ok(())
    }

    async fn device_state(&self, endpoint: &ReceiverEndpoint) -> Result<DeviceState, TransportError> {
        let url = format!("{}{}", endpoint.base_url()?, STATUS_PATH);
        debug!(url = %url, "Fetching receiver status");

        let body = self.drain(&url, self.client.get(&url)).await?;
        let state = parse_receiver_status(&body)?;

        debug!(volume = state.volume, power = ?state.power, "Receiver status read");
        Ok(state)
    }
}

/// Builder for [`ReceiverClient`]
#[derive(Debug)]
pub struct ClientBuilder {
    timeout: Duration,
    user_agent: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ReceiverClient, TransportError> {
        let client = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(ReceiverClient {
            client,
            timeout: self.timeout,
        })
    }
}

// ============================================================================
// Status document
// ============================================================================

/// `<Tag><value>...</value></Tag>`
#[derive(Debug, Deserialize)]
struct ValueNode {
    #[serde(default)]
    value: String,
}

/// Raw main zone status (`<item>` root); unknown elements are ignored.
#[derive(Debug, Deserialize)]
struct ReceiverStatusRaw {
    #[serde(rename = "MasterVolume")]
    master_volume: Option<ValueNode>,
    #[serde(rename = "Power")]
    power: Option<ValueNode>,
    #[serde(rename = "InputFuncSelect")]
    input_func_select: Option<ValueNode>,
    #[serde(rename = "Mute")]
    mute: Option<ValueNode>,
}

fn non_empty(node: Option<ValueNode>) -> Option<String> {
    node.map(|n| n.value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses the main zone status XML into a [`DeviceState`].
///
/// The volume magnitude is the absolute value of `MasterVolume` (`-40.0`
/// gives `40.0`). A missing or non-numeric volume (`--` in standby) is a
/// [`TransportError::MalformedState`].
pub fn parse_receiver_status(body: &str) -> Result<DeviceState, TransportError> {
    let trimmed = body.trim_start();
    let cleaned = trimmed.strip_prefix(BODY_ARTIFACT).unwrap_or(trimmed);

    let raw: ReceiverStatusRaw = quick_xml::de::from_str(cleaned)
        .map_err(|e| TransportError::malformed_state(format!("invalid status XML: {}", e)))?;

    let volume_text = non_empty(raw.master_volume)
        .ok_or_else(|| TransportError::malformed_state("MasterVolume is missing"))?;
    let volume = volume_text
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            TransportError::malformed_state(format!("invalid MasterVolume value: {}", volume_text))
        })?
        .abs();

    let mute = non_empty(raw.mute).and_then(|m| match m.to_ascii_lowercase().as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    });

    Ok(DeviceState {
        volume,
        power: non_empty(raw.power),
        input_function: non_empty(raw.input_func_select),
        mute,
    })
}
