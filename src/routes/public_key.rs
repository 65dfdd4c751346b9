//! Public key retrieval endpoint
//!
//! `GET /API/public-key` returns the gateway's RSA public key so clients
//! can wrap content keys for it. First hit triggers key initialization.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse<'a> {
    public_key_pem: &'a str,
}

pub fn handle_public_key(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.keys.public_key_pem() {
        Ok(pem) => {
            let body =
                serde_json::to_vec(&PublicKeyResponse { public_key_pem: pem }).unwrap_or_default();
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .header("Cache-Control", "no-store")
                .body(Full::new(Bytes::from(body)))
                .unwrap()
        }
        Err(e) => {
            // Key generation failing is a startup-class fault, not a
            // per-request one; log loudly
            error!("Gateway key pair unavailable: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(
                    r#"{"message":"key pair unavailable"}"#,
                )))
                .unwrap()
        }
    }
}
