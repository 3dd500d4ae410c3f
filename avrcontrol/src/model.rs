//! Data models for the smart-home directives and the receiver state.
//!
//! Inbound directives are untrusted: every field is optional at the type
//! level and checked by the router before use. A field of the wrong JSON
//! type reads as absent instead of failing the whole directive.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Deserializes `T`, yielding `None` when the value has another shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

fn non_blank_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

// ============================================================================
// Appliances
// ============================================================================

/// Capability an appliance advertises at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplianceAction {
    TurnOn,
    TurnOff,
    SetPercentage,
    IncrementPercentage,
    DecrementPercentage,
}

/// A catalogue entry, serialized exactly as a discovery response expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appliance {
    /// Unique within the manufacturer scope (e.g. "marantz-sr6010-shield")
    pub appliance_id: String,
    pub manufacturer_name: String,
    pub model_name: String,
    pub version: String,
    /// Name the user speaks (e.g. "Shield")
    pub friendly_name: String,
    pub friendly_description: String,
    /// Static reachability at discovery time
    pub is_reachable: bool,
    pub actions: Vec<ApplianceAction>,
}

impl Appliance {
    pub fn supports(&self, action: ApplianceAction) -> bool {
        self.actions.contains(&action)
    }
}

// ============================================================================
// Inbound directive
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectiveHeader {
    #[serde(deserialize_with = "lenient")]
    pub message_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub namespace: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub payload_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplianceRef {
    /// Kept as raw JSON so a non-string id can be quoted back in faults
    pub appliance_id: Option<Value>,
}

/// `{ "value": ... }` wrapper used by percentage payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueField {
    pub value: Option<Value>,
}

impl ValueField {
    /// Numeric reading of the value; numeric strings are accepted too.
    pub fn as_f64(&self) -> Option<f64> {
        match self.value.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectivePayload {
    pub access_token: Option<Value>,
    #[serde(deserialize_with = "lenient")]
    pub appliance: Option<ApplianceRef>,
    #[serde(deserialize_with = "lenient")]
    pub percentage_state: Option<ValueField>,
    #[serde(deserialize_with = "lenient")]
    pub delta_percentage: Option<ValueField>,
}

impl DirectivePayload {
    /// Access token with surrounding whitespace removed; blank counts as absent.
    pub fn access_token(&self) -> Option<&str> {
        non_blank_str(self.access_token.as_ref())
    }

    /// Appliance id; blank or non-string counts as absent.
    pub fn appliance_id(&self) -> Option<&str> {
        non_blank_str(self.raw_appliance_id())
    }

    fn raw_appliance_id(&self) -> Option<&Value> {
        self.appliance.as_ref()?.appliance_id.as_ref()
    }

    pub fn percentage(&self) -> Option<f64> {
        self.percentage_state.as_ref().and_then(ValueField::as_f64)
    }

    pub fn delta(&self) -> Option<f64> {
        self.delta_percentage.as_ref().and_then(ValueField::as_f64)
    }

    /// Raw JSON rendering of a payload field, as quoted in fault payloads.
    pub(crate) fn raw_field(&self, field: &str) -> String {
        let raw = match field {
            "percentageState" => self.percentage_state.as_ref().and_then(|f| f.value.clone()),
            "deltaPercentage" => self.delta_percentage.as_ref().and_then(|f| f.value.clone()),
            "applianceId" => self.raw_appliance_id().cloned(),
            _ => None,
        };
        match raw {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => "null".to_string(),
        }
    }
}

/// A smart-home directive: header + payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directive {
    pub header: DirectiveHeader,
    #[serde(deserialize_with = "lenient_or_default")]
    pub payload: DirectivePayload,
}

impl Directive {
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn message_id(&self) -> &str {
        self.header.message_id.as_deref().unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.header.name.as_deref().unwrap_or("")
    }
}

// ============================================================================
// Receiver state
// ============================================================================

/// Transient snapshot of the receiver, read on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    /// Volume magnitude on the attenuation scale (0 = loudest, 80 = quietest)
    pub volume: f64,
    pub power: Option<String>,
    pub input_function: Option<String>,
    pub mute: Option<bool>,
}

impl DeviceState {
    pub fn with_volume(volume: f64) -> Self {
        Self {
            volume,
            power: None,
            input_function: None,
            mute: None,
        }
    }
}
