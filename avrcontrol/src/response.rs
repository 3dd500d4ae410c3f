//! Outbound response envelopes.
//!
//! Pure value construction: every envelope gets a fresh UUID v4 message id
//! and the fixed namespace / payload version of its domain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::model::Appliance;
use crate::translator::DirectiveName;

pub const DISCOVERY_NAMESPACE: &str = "Alexa.ConnectedHome.Discovery";
pub const CONTROL_NAMESPACE: &str = "Alexa.ConnectedHome.Control";
pub const PAYLOAD_VERSION: &str = "2";

pub const DISCOVERY_RESPONSE_NAME: &str = "DiscoverAppliancesResponse";

/// Error responses of the control domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAccessToken,
    UnexpectedInformationReceived,
    TargetOffline,
    UnsupportedOperation,
    DriverInternal,
    ValueOutOfRange,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAccessToken => "InvalidAccessTokenError",
            ErrorKind::UnexpectedInformationReceived => "UnexpectedInformationReceivedError",
            ErrorKind::TargetOffline => "TargetOfflineError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperationError",
            ErrorKind::DriverInternal => "DriverInternalError",
            ErrorKind::ValueOutOfRange => "ValueOutOfRangeError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeader {
    pub message_id: String,
    pub name: String,
    pub namespace: String,
    pub payload_version: String,
}

/// Response returned to the voice assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub payload: Value,
}

impl Envelope {
    fn new(name: &str, namespace: &str, payload: Value) -> Self {
        Self {
            header: EnvelopeHeader {
                message_id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
                payload_version: PAYLOAD_VERSION.to_string(),
            },
            payload,
        }
    }

    /// Success response named after the directive, with an empty payload.
    pub fn confirmation(directive: DirectiveName) -> Self {
        Self::new(
            directive.confirmation_name(),
            CONTROL_NAMESPACE,
            Value::Object(Map::new()),
        )
    }

    /// Error response carrying an optional fault description.
    pub fn error(kind: ErrorKind, payload: Value) -> Self {
        let payload = match payload {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self::new(kind.name(), CONTROL_NAMESPACE, payload)
    }

    /// `UnexpectedInformationReceivedError` naming the faulting field.
    pub fn unexpected_information(field: &str, raw_value: &str) -> Self {
        Self::error(
            ErrorKind::UnexpectedInformationReceived,
            json!({ "faultingParameter": format!("{}: {}", field, raw_value) }),
        )
    }

    pub fn value_out_of_range(minimum: u8, maximum: u8) -> Self {
        Self::error(
            ErrorKind::ValueOutOfRange,
            json!({ "minimumValue": minimum, "maximumValue": maximum }),
        )
    }

    /// Discovery response listing `appliances` as given.
    pub fn discovery(appliances: &[Appliance]) -> Self {
        Self::new(
            DISCOVERY_RESPONSE_NAME,
            DISCOVERY_NAMESPACE,
            json!({ "discoveredAppliances": appliances }),
        )
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn is_error(&self) -> bool {
        self.header.name.ends_with("Error")
    }
}
