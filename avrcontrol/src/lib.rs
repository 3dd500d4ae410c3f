//! # avrcontrol - Smart-home directives for Marantz AV receivers
//!
//! Translates voice-assistant smart-home directives (payload version 2) into
//! Marantz web-control commands and builds the matching response envelopes.
//!
//! ## Flow
//!
//! ```text
//! Directive JSON ─► DirectiveRouter ─┬─► Discovery: ApplianceRegistry ─► Envelope
//!                                    └─► Control: CommandTranslator
//!                                                   │
//!                                     ReceiverTransport (GET status / POST cmdN)
//!                                                   │
//!                                                   ▼
//!                                           Confirmation / Error Envelope
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use avrcontrol::{ApplianceRegistry, DirectiveRouter, ReceiverClient, ReceiverEndpoint};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let router = DirectiveRouter::new(
//!         Arc::new(ApplianceRegistry::default_catalogue()),
//!         Arc::new(ReceiverClient::new()?),
//!         ReceiverEndpoint::new("192.168.1.20", 80),
//!     );
//!
//!     let response = router
//!         .handle_json(json!({
//!             "header": {
//!                 "messageId": "01ebf625-0b89-4c4d-b3aa-32340e894688",
//!                 "name": "TurnOnRequest",
//!                 "namespace": "Alexa.ConnectedHome.Control",
//!                 "payloadVersion": "2"
//!             },
//!             "payload": {
//!                 "accessToken": "token",
//!                 "appliance": { "applianceId": "marantz-sr6010-shield" }
//!             }
//!         }))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod command;
pub mod config_ext;
pub mod errors;
pub mod model;
pub mod receiver_client;
pub mod registry;
pub mod response;
pub mod router;
pub mod translator;

pub use command::ReceiverCommand;
pub use config_ext::AvrConfigExt;
pub use errors::{RegistryError, RouterError, TranslationError, TransportError};
pub use model::{Appliance, ApplianceAction, DeviceState, Directive, DirectivePayload};
pub use receiver_client::{
    ClientBuilder, ReceiverClient, ReceiverEndpoint, ReceiverTransport, parse_receiver_status,
};
pub use registry::{ApplianceEntry, ApplianceRegistry};
pub use response::{Envelope, EnvelopeHeader, ErrorKind};
pub use router::{AcceptAllTokens, DirectiveRouter, DiscoveryTokenPolicy, TokenValidator};
pub use translator::{CommandTranslator, DirectiveName};

/// Builds a router from the configuration: receiver endpoint and timeout,
/// appliance catalogue and discovery token policy.
pub fn router_from_config(config: &avrconfig::Config) -> anyhow::Result<DirectiveRouter> {
    let endpoint = config.get_receiver_endpoint()?;
    let registry = config.get_appliance_registry()?;
    let client = ReceiverClient::builder()
        .timeout(config.get_receiver_timeout()?)
        .user_agent(config.get_receiver_user_agent()?)
        .build()?;

    Ok(
        DirectiveRouter::new(Arc::new(registry), Arc::new(client), endpoint)
            .with_discovery_policy(config.get_discovery_token_policy()?),
    )
}
