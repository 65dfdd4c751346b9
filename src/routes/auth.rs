//! Login and logout endpoints
//!
//! `POST /API/login` accepts an encrypted envelope carrying credentials.
//! In auth debug mode they resolve against the local accounts file with no
//! backend call; otherwise the call relays to the backend login route. On
//! success the gateway issues the session cookie itself, in addition to
//! forwarding whatever cookie the backend set.
//!
//! `POST /API/logout` clears the session cookie locally.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::relay::DecodedEnvelope;
use crate::routes::secure::{error_response, outcome_response};
use crate::server::AppState;
use crate::session::Role;
use crate::types::GatewayError;

pub async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let cookie_header = req
        .headers()
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read login request body: {}", e);
            return error_response(&GatewayError::BadRequest("unreadable body".into()));
        }
    };

    let decoded = match state.relay.decode_envelope(&body) {
        Ok(decoded) => decoded,
        Err(e) => return error_response(&e),
    };

    if state.args.auth_debug {
        return local_login(state, decoded);
    }

    relayed_login(state, decoded, cookie_header.as_deref()).await
}

/// Debug mode: resolve credentials against the local accounts file.
/// No backend call is made.
fn local_login(state: Arc<AppState>, decoded: DecodedEnvelope) -> Response<Full<Bytes>> {
    if let Err(e) = state.relay.replay_check(&decoded.payload) {
        return error_response(&e);
    }

    // Credentials sit at the top level or under `body`, depending on
    // which client helper built the envelope
    let email = string_field(&decoded.plain, "email");
    let password = string_field(&decoded.plain, "password");
    let (email, password) = match (email, password) {
        (Some(email), Some(password)) => (email, password),
        _ => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "Email and password are required",
            )
        }
    };

    let account = match state.accounts.validate(&email, &password) {
        Some(account) => account.clone(),
        None => return json_error(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    };

    info!(email = %account.email, role = %account.role, "Debug-mode login");

    let user = serde_json::json!({
        "user": {
            "email": account.email,
            "role": account.role,
            "name": account.name.clone().unwrap_or_else(|| account.email.clone()),
        }
    });

    let set_cookie = state
        .cookies
        .issue(&account.email, account.role, account.name.as_deref());

    // Same contract as the relayed path: an ephemeral client key means an
    // encrypted response
    let body = match decoded.payload.client_public_key_pem.as_deref() {
        Some(pem) => match state.relay.seal_for_client(&user, pem) {
            Ok(sealed) => sealed,
            Err(e) => return error_response(&e),
        },
        None => serde_json::to_vec(&user).unwrap_or_default(),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Set-Cookie", set_cookie)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Production mode: relay the decrypted call to the backend login route
/// and issue the session cookie when it reports a user.
async fn relayed_login(
    state: Arc<AppState>,
    decoded: DecodedEnvelope,
    cookie_header: Option<&str>,
) -> Response<Full<Bytes>> {
    // Login clients put credentials at the envelope's top level rather
    // than under `body`; fold the non-control fields into the forwarded
    // body so the backend sees them
    let mut payload = decoded.payload.clone();
    if payload.body.is_none() {
        if let Value::Object(map) = &decoded.plain {
            let mut body = map.clone();
            for control in ["method", "query", "timestamp", "nonce", "clientPublicKeyPem"] {
                body.remove(control);
            }
            if !body.is_empty() {
                payload.body = Some(Value::Object(body));
            }
        }
    }

    let outcome = match state
        .relay
        .forward(&payload, "/login", cookie_header)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Login relay failed: {}", e);
            return error_response(&e);
        }
    };

    let session_cookie = if outcome.status.is_success() {
        outcome
            .plain_json
            .as_ref()
            .and_then(|json| identity_from_user(json))
            .map(|(email, role, name)| state.cookies.issue(&email, role, name.as_deref()))
    } else {
        None
    };

    let mut response = outcome_response(outcome);
    if let Some(set_cookie) = session_cookie {
        if let Ok(value) = set_cookie.parse() {
            response.headers_mut().append("Set-Cookie", value);
        }
    }
    response
}

pub fn handle_logout(state: Arc<AppState>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Set-Cookie", state.cookies.revoke())
        .body(Full::new(Bytes::from(r#"{"ok":true}"#)))
        .unwrap()
}

/// Pull `{user: {email, role, name?}}` out of a backend login response
fn identity_from_user(json: &Value) -> Option<(String, Role, Option<String>)> {
    let user = json.get("user")?;
    let email = user.get("email")?.as_str()?.to_string();
    let role: Role = user.get("role")?.as_str()?.parse().ok()?;
    let name = user
        .get("name")
        .and_then(|n| n.as_str())
        .map(|n| n.to_string());
    Some((email, role, name))
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    if let Some(s) = value.get(field).and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    value
        .get("body")
        .and_then(|body| body.get(field))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message });
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
