//! Generic secure relay endpoint
//!
//! `POST /API/{tail}` accepts an encrypted envelope and relays the call it
//! contains to the backend route of the same name. The response comes back
//! encrypted when the caller asked for that.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::warn;

use crate::relay::RelayOutcome;
use crate::server::AppState;
use crate::types::GatewayError;

pub async fn handle_secure_relay(
    req: Request<Incoming>,
    state: Arc<AppState>,
    tail: &str,
) -> Response<Full<Bytes>> {
    // Headers go away once the body is consumed
    let cookie_header = req
        .headers()
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read relay request body: {}", e);
            return error_response(&GatewayError::BadRequest("unreadable body".into()));
        }
    };

    match state.relay.relay(&body, tail, cookie_header.as_deref()).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            warn!(tail, "Relay failed: {}", e);
            error_response(&e)
        }
    }
}

/// Render a relay outcome, forwarding backend cookies
pub fn outcome_response(outcome: RelayOutcome) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(outcome.status)
        .header("Content-Type", outcome.content_type.as_str());

    for set_cookie in &outcome.set_cookies {
        builder = builder.header("Set-Cookie", set_cookie);
    }

    builder
        .body(Full::new(Bytes::from(outcome.body)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"message":"internal error"}"#)))
                .unwrap()
        })
}

/// Error response with the caller-safe message only
pub fn error_response(error: &GatewayError) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "message": error.public_message() });

    Response::builder()
        .status(error.status_code())
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
