//! Extension pour lire la configuration du récepteur et des appareils
//! depuis `avrconfig`.
//!
//! # Exemple
//!
//! ```no_run
//! use avrconfig::get_config;
//! use avrcontrol::AvrConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! let endpoint = config.get_receiver_endpoint()?;
//! let registry = config.get_appliance_registry()?;
//! println!("{} appliances behind {}:{}", registry.len(), endpoint.host, endpoint.port);
//! # Ok(())
//! # }
//! ```

use std::env;
use std::time::Duration;

use anyhow::{Result, anyhow};
use avrconfig::Config;
use serde_yaml::{Number, Value};
use tracing::{debug, warn};

use crate::receiver_client::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_USER_AGENT, ReceiverEndpoint};
use crate::registry::{ApplianceEntry, ApplianceRegistry};
use crate::router::DiscoveryTokenPolicy;

/// Legacy environment variables, read when `receiver.host` is empty.
pub const LEGACY_HOST_VAR: &str = "receiverIp";
pub const LEGACY_PORT_VAR: &str = "receiverPort";

pub const DEFAULT_RECEIVER_PORT: u16 = 80;

/// Trait d'extension pour la configuration AVRSkill
pub trait AvrConfigExt {
    /// Adresse du récepteur.
    ///
    /// Falls back to the `receiverIp` / `receiverPort` environment variables
    /// when `receiver.host` is empty. No host at all is an error.
    fn get_receiver_endpoint(&self) -> Result<ReceiverEndpoint>;

    fn set_receiver_host(&self, host: &str) -> Result<()>;

    fn set_receiver_port(&self, port: u16) -> Result<()>;

    /// Timeout applied to each receiver request (default 5 s)
    fn get_receiver_timeout(&self) -> Result<Duration>;

    fn set_receiver_timeout(&self, timeout: Duration) -> Result<()>;

    /// User-Agent sent to the receiver
    fn get_receiver_user_agent(&self) -> Result<String>;

    /// Discovery behaviour on a missing or rejected token (default enforce)
    fn get_discovery_token_policy(&self) -> Result<DiscoveryTokenPolicy>;

    fn set_discovery_token_policy(&self, policy: DiscoveryTokenPolicy) -> Result<()>;

    /// Catalogue entries in configuration order
    fn get_appliance_catalogue(&self) -> Result<Vec<ApplianceEntry>>;

    /// Registry built from [`AvrConfigExt::get_appliance_catalogue`]
    fn get_appliance_registry(&self) -> Result<ApplianceRegistry> {
        let entries = self.get_appliance_catalogue()?;
        Ok(ApplianceRegistry::new(entries)?)
    }
}

fn port_from_value(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolves the endpoint from configured values, consulting `legacy` for
/// the environment fallback.
fn resolve_endpoint(
    host: Option<String>,
    port: Option<u16>,
    legacy: impl Fn(&str) -> Option<String>,
) -> Result<ReceiverEndpoint> {
    if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
        return Ok(ReceiverEndpoint::new(
            host.trim(),
            port.unwrap_or(DEFAULT_RECEIVER_PORT),
        ));
    }

    let host = legacy(LEGACY_HOST_VAR)
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "No receiver host configured (receiver.host or {} must be set)",
                LEGACY_HOST_VAR
            )
        })?;

    let port = match legacy(LEGACY_PORT_VAR) {
        Some(raw) => match raw.trim().parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                warn!("Invalid {} '{}', using {}", LEGACY_PORT_VAR, raw, DEFAULT_RECEIVER_PORT);
                DEFAULT_RECEIVER_PORT
            }
        },
        None => port.unwrap_or(DEFAULT_RECEIVER_PORT),
    };

    debug!(host = %host, port, "Receiver endpoint taken from legacy environment");
    Ok(ReceiverEndpoint::new(host, port))
}

impl AvrConfigExt for Config {
    fn get_receiver_endpoint(&self) -> Result<ReceiverEndpoint> {
        let host = match self.get_value(&["receiver", "host"]) {
            Ok(Value::String(s)) => Some(s),
            _ => None,
        };
        let port = self
            .get_value(&["receiver", "port"])
            .ok()
            .and_then(|v| port_from_value(&v));

        resolve_endpoint(host, port, |name| env::var(name).ok())
    }

    fn set_receiver_host(&self, host: &str) -> Result<()> {
        self.set_value(&["receiver", "host"], Value::String(host.to_string()))
    }

    fn set_receiver_port(&self, port: u16) -> Result<()> {
        self.set_value(&["receiver", "port"], Value::Number(Number::from(port)))
    }

    fn get_receiver_timeout(&self) -> Result<Duration> {
        match self.get_value(&["receiver", "timeout_ms"]) {
            Ok(Value::Number(n)) if n.as_u64().is_some_and(|ms| ms > 0) => {
                Ok(Duration::from_millis(n.as_u64().unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)))
            }
            Ok(other) if !other.is_null() => {
                warn!(
                    "Invalid receiver timeout {:?}, using {} ms",
                    other, DEFAULT_REQUEST_TIMEOUT_MS
                );
                Ok(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
            }
            _ => Ok(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
        }
    }

    fn set_receiver_timeout(&self, timeout: Duration) -> Result<()> {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.set_value(&["receiver", "timeout_ms"], Value::Number(Number::from(ms)))
    }

    fn get_receiver_user_agent(&self) -> Result<String> {
        match self.get_value(&["receiver", "user_agent"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Ok(DEFAULT_USER_AGENT.to_string()),
        }
    }

    fn get_discovery_token_policy(&self) -> Result<DiscoveryTokenPolicy> {
        match self.get_value(&["discovery", "token_policy"]) {
            Ok(Value::String(s)) => s.parse().map_err(|e: String| anyhow!(e)),
            _ => Ok(DiscoveryTokenPolicy::default()),
        }
    }

    fn set_discovery_token_policy(&self, policy: DiscoveryTokenPolicy) -> Result<()> {
        self.set_value(&["discovery", "token_policy"], serde_yaml::to_value(policy)?)
    }

    fn get_appliance_catalogue(&self) -> Result<Vec<ApplianceEntry>> {
        match self.get_value(&["appliances"]) {
            Ok(Value::Null) | Err(_) => Ok(Vec::new()),
            Ok(value) => serde_yaml::from_value(value)
                .map_err(|e| anyhow!("Invalid appliance catalogue: {}", e)),
        }
    }
}
