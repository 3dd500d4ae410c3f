//! Top-level directive dispatch.
//!
//! Every failure below namespace dispatch becomes a response envelope; only
//! an unrecognized namespace (and, under [`DiscoveryTokenPolicy::Enforce`],
//! a rejected discovery token) is returned as a [`RouterError`].

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::errors::{RouterError, TranslationError};
use crate::model::Directive;
use crate::receiver_client::{ReceiverEndpoint, ReceiverTransport};
use crate::registry::ApplianceRegistry;
use crate::response::{CONTROL_NAMESPACE, DISCOVERY_NAMESPACE, Envelope, ErrorKind};
use crate::translator::{CommandTranslator, DirectiveName, check_payload};

/// Access token validation seam.
pub trait TokenValidator: Send + Sync {
    fn is_valid(&self, token: &str) -> bool;
}

/// Accepts every non-blank token.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllTokens;

impl TokenValidator for AcceptAllTokens {
    fn is_valid(&self, _token: &str) -> bool {
        true
    }
}

/// What discovery does when the access token is missing or rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryTokenPolicy {
    /// Fail the request without listing appliances
    #[default]
    Enforce,
    /// Log the failure and list the appliances anyway
    Lenient,
}

impl FromStr for DiscoveryTokenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(DiscoveryTokenPolicy::Enforce),
            "lenient" => Ok(DiscoveryTokenPolicy::Lenient),
            other => Err(format!("unknown discovery token policy '{}'", other)),
        }
    }
}

/// Routes directives to discovery or receiver control.
///
/// Stateless across requests; share it behind an `Arc`.
pub struct DirectiveRouter {
    registry: Arc<ApplianceRegistry>,
    transport: Arc<dyn ReceiverTransport>,
    endpoint: ReceiverEndpoint,
    tokens: Arc<dyn TokenValidator>,
    discovery_policy: DiscoveryTokenPolicy,
}

impl DirectiveRouter {
    pub fn new(
        registry: Arc<ApplianceRegistry>,
        transport: Arc<dyn ReceiverTransport>,
        endpoint: ReceiverEndpoint,
    ) -> Self {
        Self {
            registry,
            transport,
            endpoint,
            tokens: Arc::new(AcceptAllTokens),
            discovery_policy: DiscoveryTokenPolicy::default(),
        }
    }

    pub fn with_token_validator(mut self, tokens: Arc<dyn TokenValidator>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_discovery_policy(mut self, policy: DiscoveryTokenPolicy) -> Self {
        self.discovery_policy = policy;
        self
    }

    pub fn registry(&self) -> &ApplianceRegistry {
        &self.registry
    }

    pub fn endpoint(&self) -> &ReceiverEndpoint {
        &self.endpoint
    }

    /// Parses a raw JSON directive and handles it.
    pub async fn handle_json(&self, value: Value) -> Result<Envelope, RouterError> {
        let directive = Directive::from_json(value)?;
        self.handle(&directive).await
    }

    pub async fn handle(&self, directive: &Directive) -> Result<Envelope, RouterError> {
        match directive.header.namespace.as_deref() {
            Some(DISCOVERY_NAMESPACE) => self.handle_discovery(directive),
            Some(CONTROL_NAMESPACE) => Ok(self.handle_control(directive).await),
            other => {
                let namespace = other.unwrap_or("<missing>").to_string();
                error!(namespace = %namespace, "No supported namespace");
                Err(RouterError::UnsupportedNamespace(namespace))
            }
        }
    }

    fn token_is_valid(&self, token: Option<&str>) -> bool {
        token.is_some_and(|t| self.tokens.is_valid(t))
    }

    fn handle_discovery(&self, directive: &Directive) -> Result<Envelope, RouterError> {
        debug!(message_id = directive.message_id(), "Discovery request");

        let token = directive.payload.access_token();
        if !self.token_is_valid(token) {
            let token = token.unwrap_or("").to_string();
            match self.discovery_policy {
                DiscoveryTokenPolicy::Enforce => {
                    error!(
                        message_id = directive.message_id(),
                        "Discovery request failed: invalid access token"
                    );
                    return Err(RouterError::InvalidAccessToken {
                        message_id: directive.message_id().to_string(),
                        token,
                    });
                }
                DiscoveryTokenPolicy::Lenient => {
                    warn!(
                        message_id = directive.message_id(),
                        "Invalid access token on discovery, listing appliances anyway"
                    );
                }
            }
        }

        let response = Envelope::discovery(self.registry.list_appliances());
        info!(count = self.registry.len(), "Discovery response built");
        Ok(response)
    }

    async fn handle_control(&self, directive: &Directive) -> Envelope {
        debug!(
            message_id = directive.message_id(),
            name = directive.name(),
            "Control request"
        );
        let response = self.control(directive).await;
        if response.is_error() {
            warn!(name = response.name(), payload = %response.payload, "Control request failed");
        } else {
            debug!(name = response.name(), "Control confirmation");
        }
        response
    }

    async fn control(&self, directive: &Directive) -> Envelope {
        let payload = &directive.payload;

        if !self.token_is_valid(payload.access_token()) {
            error!(message_id = directive.message_id(), "Invalid access token");
            return Envelope::error(ErrorKind::InvalidAccessToken, Value::Null);
        }

        let Some(appliance_id) = payload.appliance_id() else {
            error!("No applianceId provided in request");
            return Envelope::unexpected_information("applianceId", &payload.raw_field("applianceId"));
        };

        let appliance = match self.registry.find_appliance(appliance_id) {
            Ok(appliance) => appliance,
            Err(err) => {
                error!(error = %err, "Directive targets an unknown appliance");
                return Envelope::unexpected_information("applianceId", appliance_id);
            }
        };

        if !appliance.is_reachable {
            error!(appliance_id, "Device offline");
            return Envelope::error(ErrorKind::TargetOffline, Value::Null);
        }

        let name = match directive.name().parse::<DirectiveName>() {
            Ok(name) => name,
            Err(err) => {
                error!(error = %err, "No supported directive name");
                return Envelope::error(ErrorKind::UnsupportedOperation, Value::Null);
            }
        };

        if !appliance.supports(name.action()) {
            error!(
                appliance_id,
                directive = name.request_name(),
                "Appliance does not advertise this action"
            );
            return Envelope::error(ErrorKind::UnsupportedOperation, Value::Null);
        }

        if let Err(err) = check_payload(name, payload) {
            return self.translation_failure(&err, directive);
        }

        let state = if name.needs_device_state() {
            match self.transport.device_state(&self.endpoint).await {
                Ok(state) => Some(state),
                Err(err) => {
                    error!(error = %err, "Receiver state read failed");
                    return Envelope::error(ErrorKind::DriverInternal, Value::Null);
                }
            }
        } else {
            None
        };

        let commands = match CommandTranslator::new(&self.registry).translate(
            name,
            appliance_id,
            payload,
            state.as_ref(),
        ) {
            Ok(commands) => commands,
            Err(err) => return self.translation_failure(&err, directive),
        };

        match self.transport.send_commands(&self.endpoint, &commands).await {
            Ok(()) => Envelope::confirmation(name),
            Err(err) => {
                error!(error = %err, "Receiver command batch failed");
                Envelope::error(ErrorKind::DriverInternal, Value::Null)
            }
        }
    }

    fn translation_failure(&self, err: &TranslationError, directive: &Directive) -> Envelope {
        error!(error = %err, "Directive rejected");
        match err {
            TranslationError::MissingField(field) => {
                Envelope::unexpected_information(field, &directive.payload.raw_field(field))
            }
            TranslationError::OutOfRange { min, max, .. } => Envelope::value_out_of_range(*min, *max),
            TranslationError::UnsupportedDirective(_) => {
                Envelope::error(ErrorKind::UnsupportedOperation, Value::Null)
            }
            TranslationError::MissingDeviceState => {
                Envelope::error(ErrorKind::DriverInternal, Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::command::ReceiverCommand;
    use crate::errors::TransportError;
    use crate::model::{Appliance, ApplianceAction, DeviceState};
    use crate::registry::ApplianceEntry;

    /// Records every call and answers with canned results.
    #[derive(Default)]
    struct RecordingTransport {
        volume: Option<f64>,
        fail_write: bool,
        sent: Mutex<Vec<Vec<String>>>,
        reads: Mutex<usize>,
    }

    impl RecordingTransport {
        fn with_volume(volume: f64) -> Self {
            Self {
                volume: Some(volume),
                ..Default::default()
            }
        }

        fn failing_writes() -> Self {
            Self {
                fail_write: true,
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<Vec<String>> {
            self.sent.lock().unwrap().clone()
        }

        fn reads(&self) -> usize {
            *self.reads.lock().unwrap()
        }
    }

    #[async_trait]
    impl ReceiverTransport for RecordingTransport {
        async fn send_commands(
            &self,
            _endpoint: &ReceiverEndpoint,
            commands: &[ReceiverCommand],
        ) -> Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push(commands.iter().map(ToString::to_string).collect());
            if self.fail_write {
                Err(TransportError::Connect("http://test".to_string(), "refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn device_state(
            &self,
            _endpoint: &ReceiverEndpoint,
        ) -> Result<DeviceState, TransportError> {
            *self.reads.lock().unwrap() += 1;
            self.volume
                .map(DeviceState::with_volume)
                .ok_or_else(|| TransportError::malformed_state("no volume"))
        }
    }

    struct RejectAll;

    impl TokenValidator for RejectAll {
        fn is_valid(&self, _token: &str) -> bool {
            false
        }
    }

    fn appliance(id: &str, reachable: bool, actions: Vec<ApplianceAction>) -> ApplianceEntry {
        ApplianceEntry {
            appliance: Appliance {
                appliance_id: id.to_string(),
                manufacturer_name: "Marantz".to_string(),
                model_name: "SR6010".to_string(),
                version: "1.0".to_string(),
                friendly_name: id.to_string(),
                friendly_description: "test appliance".to_string(),
                is_reachable: reachable,
                actions,
            },
            input_function: Some("MPLAY".to_string()),
        }
    }

    fn registry() -> Arc<ApplianceRegistry> {
        let all = vec![
            ApplianceAction::TurnOn,
            ApplianceAction::TurnOff,
            ApplianceAction::SetPercentage,
            ApplianceAction::IncrementPercentage,
            ApplianceAction::DecrementPercentage,
        ];
        Arc::new(
            ApplianceRegistry::new(vec![
                appliance("shield-device", true, all.clone()),
                appliance("offline-device", false, all),
                appliance("power-only", true, vec![ApplianceAction::TurnOn, ApplianceAction::TurnOff]),
            ])
            .unwrap(),
        )
    }

    fn router(transport: Arc<RecordingTransport>) -> DirectiveRouter {
        DirectiveRouter::new(registry(), transport, ReceiverEndpoint::new("127.0.0.1", 80))
    }

    fn control(name: &str, payload: Value) -> Value {
        json!({
            "header": {
                "messageId": "6d6d6e14-8aee-473e-8c24-0d31ff9c17a2",
                "name": name,
                "namespace": CONTROL_NAMESPACE,
                "payloadVersion": "2"
            },
            "payload": payload
        })
    }

    fn discovery(payload: Value) -> Value {
        json!({
            "header": {
                "messageId": "ff746d98-ab02-4c9e-9d0d-b44711658414",
                "name": "DiscoverAppliancesRequest",
                "namespace": DISCOVERY_NAMESPACE,
                "payloadVersion": "2"
            },
            "payload": payload
        })
    }

    #[tokio::test]
    async fn test_turn_on_sends_input_and_confirms() {
        let transport = Arc::new(RecordingTransport::default());
        let response = router(transport.clone())
            .handle_json(control(
                "TurnOnRequest",
                json!({"accessToken": "t", "appliance": {"applianceId": "shield-device"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "TurnOnConfirmation");
        assert_eq!(response.payload, json!({}));
        assert_eq!(
            transport.sent(),
            vec![vec![
                "PutZone_OnOff/ON".to_string(),
                "PutZone_InputFunction/MPLAY".to_string(),
                "aspMainZone_WebUpdateStatus/".to_string(),
            ]]
        );
        assert_eq!(transport.reads(), 0);
    }

    #[tokio::test]
    async fn test_increment_reads_then_writes() {
        let transport = Arc::new(RecordingTransport::with_volume(40.0));
        let response = router(transport.clone())
            .handle_json(control(
                "IncrementPercentageRequest",
                json!({
                    "accessToken": "t",
                    "appliance": {"applianceId": "shield-device"},
                    "deltaPercentage": {"value": 25}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "IncrementPercentageConfirmation");
        assert_eq!(transport.reads(), 1);
        assert_eq!(
            transport.sent(),
            vec![vec![
                "PutMasterVolumeSet/-20".to_string(),
                "aspMainZone_WebUpdateStatus/".to_string(),
            ]]
        );
    }

    #[tokio::test]
    async fn test_failed_state_read_skips_write() {
        let transport = Arc::new(RecordingTransport::default());
        let response = router(transport.clone())
            .handle_json(control(
                "DecrementPercentageRequest",
                json!({
                    "accessToken": "t",
                    "appliance": {"applianceId": "shield-device"},
                    "deltaPercentage": {"value": 10}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "DriverInternalError");
        assert_eq!(transport.reads(), 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_driver_internal_without_retry() {
        let transport = Arc::new(RecordingTransport::failing_writes());
        let response = router(transport.clone())
            .handle_json(control(
                "TurnOffRequest",
                json!({"accessToken": "t", "appliance": {"applianceId": "shield-device"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "DriverInternalError");
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_name_the_faulting_parameter() {
        let cases = [
            (
                control("TurnOnRequest", json!({"accessToken": "t", "appliance": {}})),
                "applianceId: null",
            ),
            (
                control(
                    "SetPercentageRequest",
                    json!({"accessToken": "t", "appliance": {"applianceId": "shield-device"}}),
                ),
                "percentageState: null",
            ),
            (
                control(
                    "IncrementPercentageRequest",
                    json!({"accessToken": "t", "appliance": {"applianceId": "shield-device"}}),
                ),
                "deltaPercentage: null",
            ),
            (
                control(
                    "DecrementPercentageRequest",
                    json!({
                        "accessToken": "t",
                        "appliance": {"applianceId": "shield-device"},
                        "deltaPercentage": {"value": "lots"}
                    }),
                ),
                "deltaPercentage: lots",
            ),
            (
                control(
                    "IncrementPercentageRequest",
                    json!({
                        "accessToken": "t",
                        "appliance": {"applianceId": "shield-device"},
                        "deltaPercentage": {"value": 0}
                    }),
                ),
                "deltaPercentage: 0",
            ),
            (
                control("TurnOnRequest", json!({"accessToken": "t", "appliance": {"applianceId": 42}})),
                "applianceId: 42",
            ),
            (
                control(
                    "TurnOnRequest",
                    json!({"accessToken": "t", "appliance": "shield-device"}),
                ),
                "applianceId: null",
            ),
        ];

        for (request, fault) in cases {
            let transport = Arc::new(RecordingTransport::with_volume(40.0));
            let response = router(transport.clone()).handle_json(request).await.unwrap();

            assert_eq!(response.name(), "UnexpectedInformationReceivedError");
            assert_eq!(response.payload["faultingParameter"], fault);
            assert!(transport.sent().is_empty());
            assert_eq!(transport.reads(), 0);
        }
    }

    #[tokio::test]
    async fn test_non_string_token_is_invalid() {
        let transport = Arc::new(RecordingTransport::default());
        let response = router(transport.clone())
            .handle_json(control(
                "TurnOnRequest",
                json!({"accessToken": 123, "appliance": {"applianceId": "shield-device"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "InvalidAccessTokenError");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_appliance() {
        let transport = Arc::new(RecordingTransport::default());
        let response = router(transport.clone())
            .handle_json(control(
                "TurnOnRequest",
                json!({"accessToken": "t", "appliance": {"applianceId": "toaster"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "UnexpectedInformationReceivedError");
        assert_eq!(response.payload["faultingParameter"], "applianceId: toaster");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_directive_and_action() {
        let transport = Arc::new(RecordingTransport::default());
        let router = router(transport.clone());

        let response = router
            .handle_json(control(
                "SetColorRequest",
                json!({"accessToken": "t", "appliance": {"applianceId": "shield-device"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.name(), "UnsupportedOperationError");

        let response = router
            .handle_json(control(
                "SetPercentageRequest",
                json!({
                    "accessToken": "t",
                    "appliance": {"applianceId": "power-only"},
                    "percentageState": {"value": 50}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.name(), "UnsupportedOperationError");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_offline_appliance() {
        let transport = Arc::new(RecordingTransport::default());
        let response = router(transport.clone())
            .handle_json(control(
                "TurnOnRequest",
                json!({"accessToken": "t", "appliance": {"applianceId": "offline-device"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "TargetOfflineError");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_percentage() {
        let transport = Arc::new(RecordingTransport::default());
        let response = router(transport.clone())
            .handle_json(control(
                "SetPercentageRequest",
                json!({
                    "accessToken": "t",
                    "appliance": {"applianceId": "shield-device"},
                    "percentageState": {"value": 140}
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.name(), "ValueOutOfRangeError");
        assert_eq!(response.payload, json!({"minimumValue": 0, "maximumValue": 100}));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_token_on_control() {
        let transport = Arc::new(RecordingTransport::default());

        let response = router(transport.clone())
            .handle_json(control(
                "TurnOnRequest",
                json!({"accessToken": "   ", "appliance": {"applianceId": "shield-device"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.name(), "InvalidAccessTokenError");

        let response = router(transport.clone())
            .with_token_validator(Arc::new(RejectAll))
            .handle_json(control(
                "TurnOnRequest",
                json!({"accessToken": "t", "appliance": {"applianceId": "shield-device"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.name(), "InvalidAccessTokenError");
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_lists_registry_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        let router = router(transport);
        let response = router
            .handle_json(discovery(json!({"accessToken": "t"})))
            .await
            .unwrap();

        assert_eq!(response.name(), "DiscoverAppliancesResponse");
        assert_eq!(response.header.namespace, DISCOVERY_NAMESPACE);
        let listed: Vec<Appliance> =
            serde_json::from_value(response.payload["discoveredAppliances"].clone()).unwrap();
        assert_eq!(listed, router.registry().list_appliances());
    }

    #[tokio::test]
    async fn test_discovery_token_policies() {
        let enforcing = router(Arc::new(RecordingTransport::default()));
        let err = enforcing
            .handle_json(discovery(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidAccessToken { .. }));

        let lenient = router(Arc::new(RecordingTransport::default()))
            .with_token_validator(Arc::new(RejectAll))
            .with_discovery_policy(DiscoveryTokenPolicy::Lenient);
        let response = lenient
            .handle_json(discovery(json!({"accessToken": "t"})))
            .await
            .unwrap();
        assert_eq!(response.name(), "DiscoverAppliancesResponse");
        assert_eq!(
            response.payload["discoveredAppliances"]
                .as_array()
                .map(Vec::len),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_a_hard_failure() {
        let router = router(Arc::new(RecordingTransport::default()));

        let err = router
            .handle_json(json!({
                "header": {"namespace": "Alexa.ConnectedHome.Query", "name": "GetTargetTemperatureRequest"},
                "payload": {"accessToken": "t"}
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::UnsupportedNamespace(ref ns) if ns == "Alexa.ConnectedHome.Query"));

        let err = router.handle_json(json!({"payload": {}})).await.unwrap_err();
        assert!(matches!(err, RouterError::UnsupportedNamespace(_)));
    }

    #[tokio::test]
    async fn test_malformed_directive() {
        let router = router(Arc::new(RecordingTransport::default()));
        let err = router
            .handle_json(json!({"header": "not an object"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::MalformedDirective(_)));
    }

    #[test]
    fn test_discovery_policy_parsing() {
        assert_eq!("Lenient".parse(), Ok(DiscoveryTokenPolicy::Lenient));
        assert_eq!(" enforce ".parse(), Ok(DiscoveryTokenPolicy::Enforce));
        assert!("sometimes".parse::<DiscoveryTokenPolicy>().is_err());
    }
}
