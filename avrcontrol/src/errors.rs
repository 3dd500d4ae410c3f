use std::time::Duration;

use thiserror::Error;

/// Errors raised while building or querying the appliance catalogue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown appliance {0}")]
    NotFound(String),
    #[error("Appliance {0} is declared more than once")]
    DuplicateId(String),
    #[error("Invalid appliance catalogue: {0}")]
    InvalidCatalogue(String),
}

/// Errors raised while turning a directive into receiver commands.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    #[error("Missing required field {0}")]
    MissingField(&'static str),
    #[error("{field} value {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: u8,
        max: u8,
    },
    #[error("Relative volume change requires the current receiver state")]
    MissingDeviceState,
    #[error("Unsupported directive {0}")]
    UnsupportedDirective(String),
}

/// Errors raised by the receiver HTTP client.
///
/// All of them are recoverable at the request level: the router turns them
/// into a `DriverInternalError` envelope and never retries.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid receiver endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Cannot build receiver HTTP client: {0}")]
    Client(String),
    #[error("HTTP request to {0} failed: {1}")]
    Connect(String, String),
    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },
    #[error("Failed to read receiver response body: {0}")]
    Body(String),
    #[error("Receiver request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed receiver state: {0}")]
    MalformedState(String),
}

impl TransportError {
    pub fn malformed_state(message: impl Into<String>) -> Self {
        TransportError::MalformedState(message.into())
    }
}

/// Hard failures: conditions that cannot be expressed as a directive
/// response envelope and are handed back to the hosting platform.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("No supported namespace: {0}")]
    UnsupportedNamespace(String),
    #[error("Discovery request [{message_id}] failed. Invalid access token: {token}")]
    InvalidAccessToken { message_id: String, token: String },
    #[error("Malformed directive: {0}")]
    MalformedDirective(#[from] serde_json::Error),
}
