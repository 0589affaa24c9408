//! HTTP request handlers
//!
//! The registry-backed pairing API: create a request, redeem a
//! shortcode, poll for the outcome.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use pairlink_core::{Error, Metadata};
use pairlink_pairing::{InitialPairingData, InitiatorPairDetails, PairingStatus};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Pairing API
        .route("/pairing", post(create_pairing_handler))
        .route("/pairing/respond/:shortcode", post(respond_handler))
        .route("/pairing/status/:pairing_id", get(status_handler))
        // WebSocket endpoints, plus the redeem path for pairings
        // created over the socket
        .route("/pairing/ws", get(crate::websocket::pairing_ws_handler))
        .route(
            "/pairing/ws/respond/:shortcode",
            post(ws_respond_handler),
        )
        .route("/signalling", get(crate::websocket::signalling_ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Body for both create and respond: the caller's public key plus
/// whatever metadata it wants the other side to see.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingBody {
    public_key: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

fn http_error(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Register a responder and issue its shortcode + token
async fn create_pairing_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PairingBody>,
) -> Result<Json<InitialPairingData>, (StatusCode, String)> {
    state
        .registry
        .create_pairing_request(&body.public_key, body.metadata)
        .await
        .map(Json)
        .map_err(http_error)
}

/// Redeem a shortcode on behalf of an initiator
async fn respond_handler(
    State(state): State<Arc<AppState>>,
    Path(shortcode): Path<String>,
    Json(body): Json<PairingBody>,
) -> Result<Json<InitiatorPairDetails>, (StatusCode, String)> {
    state
        .registry
        .respond_to_pairing_request(&shortcode, &body.public_key, body.metadata)
        .await
        .map(Json)
        .map_err(http_error)
}

/// Redeem a shortcode issued on the WebSocket surface. Those pairings
/// live in the channel engine, not the registry; a waiting responder
/// socket gets its outcome pushed when this succeeds.
async fn ws_respond_handler(
    State(state): State<Arc<AppState>>,
    Path(shortcode): Path<String>,
    Json(body): Json<PairingBody>,
) -> Result<Json<InitiatorPairDetails>, (StatusCode, String)> {
    state
        .engine
        .respond_to_pairing_request(&shortcode, &body.public_key, body.metadata)
        .await
        .map(Json)
        .map_err(http_error)
}

/// Poll a pairing's status; a redeemed entry is consumed by this read
async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(pairing_id): Path<String>,
) -> Result<Json<PairingStatus>, (StatusCode, String)> {
    state
        .registry
        .check_pairing_status(&pairing_id)
        .await
        .map(Json)
        .map_err(http_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pairlink_core::{Config, InMemoryChannelFactory, KeyedTokenSigner};
    use pairlink_pairing::{PairingEngine, PairingOutcome, PairingRegistry};
    use pairlink_signalling::{InMemoryConnectionStore, PassThroughAuthValidator, SignallingEngine};
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let signer = Arc::new(KeyedTokenSigner::new("test-secret"));
        let registry = Arc::new(
            PairingRegistry::new(signer.clone())
                .with_shortcode_generator(|| "ABC123".to_string())
                .with_pairing_id_generator(|| "p1".to_string()),
        );
        let engine = Arc::new(PairingEngine::new(
            Arc::new(InMemoryChannelFactory::new()),
            signer,
        ));
        let signalling = SignallingEngine::new(
            Arc::new(InMemoryConnectionStore::new()),
            Arc::new(PassThroughAuthValidator),
        );
        Arc::new(AppState::new(Config::new(), registry, engine, signalling))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_respond_status_flow() {
        let router = create_router(test_state());

        let response = router
            .clone()
            .oneshot(post_json("/pairing", r#"{"publicKey":"RESP_KEY"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = json_body(response).await;
        assert_eq!(created["shortcode"], "ABC123");
        assert_eq!(created["pairingId"], "p1");

        let response = router
            .clone()
            .oneshot(post_json(
                "/pairing/respond/ABC123",
                r#"{"publicKey":"INIT_KEY"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let details = json_body(response).await;
        assert_eq!(details["pairingId"], "p1");
        assert_eq!(details["responderPublicKey"], "RESP_KEY");

        let response = router
            .clone()
            .oneshot(Request::get("/pairing/status/p1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = json_body(response).await;
        assert_eq!(status["status"], "paired");
        assert_eq!(status["initiatorPublicKey"], "INIT_KEY");
    }

    #[tokio::test]
    async fn test_ws_created_pairing_redeemable_over_http() {
        let state = test_state();
        let router = create_router(state.clone());

        let pending = state
            .engine
            .create_pairing_request("RESP_KEY", None)
            .await
            .unwrap();
        let uri = format!("/pairing/ws/respond/{}", pending.shortcode());

        let response = router
            .oneshot(post_json(&uri, r#"{"publicKey":"INIT_KEY"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let details = json_body(response).await;
        assert_eq!(details["pairingId"], pending.pairing_id());
        assert_eq!(details["responderPublicKey"], "RESP_KEY");

        // The waiting responder sees the redemption, not an expiry.
        match pending.redemption_result().await {
            PairingOutcome::Paired {
                initiator_public_key,
                ..
            } => assert_eq!(initiator_public_key, "INIT_KEY"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_shortcode_is_404() {
        let router = create_router(test_state());

        let response = router
            .oneshot(post_json(
                "/pairing/respond/ZZZZZZ",
                r#"{"publicKey":"INIT_KEY"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_pairing_status_is_404() {
        let router = create_router(test_state());

        let response = router
            .oneshot(
                Request::get("/pairing/status/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
