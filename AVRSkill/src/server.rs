//! HTTP surface of the skill.
//!
//! - `POST /directive` : one directive in, one response envelope out
//!   (`400 {"error": ...}` for hard failures)
//! - `GET /info` : version and receiver address

use std::net::SocketAddr;
use std::sync::Arc;

use avrcontrol::DirectiveRouter;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::signal;
use tracing::{debug, error, info};

/// Construit le routeur axum autour du routeur de directives
pub fn app(directives: Arc<DirectiveRouter>) -> Router {
    Router::new()
        .route("/directive", post(directive))
        .route("/info", get(server_info))
        .with_state(directives)
}

async fn directive(
    State(directives): State<Arc<DirectiveRouter>>,
    Json(body): Json<Value>,
) -> Response {
    debug!(request = %body, "Directive received");

    match directives.handle_json(body).await {
        Ok(envelope) => {
            info!(name = envelope.name(), "Directive handled");
            (StatusCode::OK, Json(envelope)).into_response()
        }
        Err(err) => {
            error!(error = %err, "Directive rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn server_info(State(directives): State<Arc<DirectiveRouter>>) -> Json<Value> {
    let endpoint = directives.endpoint();
    Json(json!({
        "name": "AVRSkill",
        "version": env!("CARGO_PKG_VERSION"),
        "receiver": format!("{}:{}", endpoint.host, endpoint.port),
        "appliances": directives.registry().len(),
    }))
}

/// Sert `app` jusqu'à Ctrl+C
pub async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("AVRSkill listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                error!(error = %err, "Failed to listen for Ctrl+C");
            }
            info!("Ctrl+C reçu, arrêt gracieux");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use avrcontrol::{
        ApplianceRegistry, DeviceState, ReceiverCommand, ReceiverEndpoint, ReceiverTransport,
        TransportError,
    };
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    struct IdleReceiver;

    #[async_trait]
    impl ReceiverTransport for IdleReceiver {
        async fn send_commands(
            &self,
            _endpoint: &ReceiverEndpoint,
            _commands: &[ReceiverCommand],
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn device_state(
            &self,
            _endpoint: &ReceiverEndpoint,
        ) -> Result<DeviceState, TransportError> {
            Ok(DeviceState::with_volume(40.0))
        }
    }

    fn test_app() -> Router {
        app(Arc::new(DirectiveRouter::new(
            Arc::new(ApplianceRegistry::default_catalogue()),
            Arc::new(IdleReceiver),
            ReceiverEndpoint::new("192.168.1.20", 80),
        )))
    }

    async fn post_directive(body: Value) -> (StatusCode, Value) {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/directive")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_control_directive_returns_envelope() {
        let (status, body) = post_directive(json!({
            "header": {
                "messageId": "m-1",
                "name": "TurnOffRequest",
                "namespace": "Alexa.ConnectedHome.Control",
                "payloadVersion": "2"
            },
            "payload": {
                "accessToken": "t",
                "appliance": {"applianceId": "marantz-sr6010-cable"}
            }
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["header"]["name"], "TurnOffConfirmation");
        assert_eq!(body["header"]["payloadVersion"], "2");
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_bad_request() {
        let (status, body) = post_directive(json!({
            "header": {"namespace": "Alexa.ConnectedHome.Query", "name": "GetLockStateRequest"},
            "payload": {}
        }))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Alexa.ConnectedHome.Query"));
    }

    #[tokio::test]
    async fn test_info() {
        let response = test_app()
            .oneshot(Request::builder().uri("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["receiver"], "192.168.1.20:80");
        assert_eq!(body["appliances"], 2);
    }
}
