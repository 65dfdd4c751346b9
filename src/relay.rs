//! Secure relay: envelope in, signed backend call out.
//!
//! Per call: open the inbound envelope, rebuild a plain backend request,
//! attach the gateway HMAC credential and the caller's cookie, forward,
//! and (when the caller supplied an ephemeral public key) wrap the JSON
//! response in a fresh envelope addressed to that key.
//!
//! The relay holds no per-call state and never retries; a failed backend
//! call surfaces as a 502-class error and idempotency stays the backend's
//! problem.

use hyper::StatusCode;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::envelope::{self, EncryptedEnvelope};
use crate::keys::KeyStore;
use crate::session::{ensure_same_site, SameSite};
use crate::signing::{ReplayGuard, SignedHeaders};
use crate::types::{GatewayError, Result};

/// Decrypted envelope contents addressed to the relay.
///
/// Extra fields (a login's credentials, say) stay in the raw JSON and are
/// not the relay's concern.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    /// HTTP method for the backend call; defaults to POST
    pub method: Option<String>,
    /// JSON body, re-serialized verbatim for non-GET calls
    pub body: Option<Value>,
    /// Query parameters, re-serialized onto the backend URL
    pub query: Option<BTreeMap<String, String>>,
    /// Epoch-millisecond timestamp for the signature and replay window
    pub timestamp: Option<i64>,
    /// One-time nonce for the signature and replay window
    pub nonce: Option<String>,
    /// Ephemeral public key: "encrypt the response back to me"
    pub client_public_key_pem: Option<String>,
}

/// An inbound envelope after decryption
#[derive(Debug)]
pub struct DecodedEnvelope {
    pub payload: RelayPayload,
    /// Full decrypted document, including fields beyond [`RelayPayload`]
    pub plain: Value,
}

/// What came back from the backend, ready for the transport layer
#[derive(Debug)]
pub struct RelayOutcome {
    pub status: StatusCode,
    pub content_type: String,
    /// Response body; an envelope when the caller asked for encryption
    pub body: Vec<u8>,
    /// Backend `set-cookie` values, SameSite-normalized
    pub set_cookies: Vec<String>,
    /// Backend JSON before any re-encryption (for cookie issuance at login)
    pub plain_json: Option<Value>,
}

/// Stateless per-call relay between envelope transport and the backend.
pub struct SecureRelay {
    client: reqwest::Client,
    backend_base: String,
    shared_secret: Option<String>,
    keys: Arc<KeyStore>,
    replay: ReplayGuard,
}

impl SecureRelay {
    pub fn new(backend_base: String, shared_secret: Option<String>, keys: Arc<KeyStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend_base,
            shared_secret,
            keys,
            replay: ReplayGuard::new(),
        }
    }

    /// Parse and decrypt a raw request body into a relay payload.
    ///
    /// Every failure mode (not JSON, not an envelope, any decryption
    /// check) collapses to the same opaque error.
    pub fn decode_envelope(&self, raw: &[u8]) -> Result<DecodedEnvelope> {
        let envelope: EncryptedEnvelope =
            serde_json::from_slice(raw).map_err(|_| GatewayError::Decryption)?;

        let pair = self.keys.get()?;
        let plaintext = envelope::open(&envelope, &pair.private_key)?;

        let plain: Value =
            serde_json::from_slice(&plaintext).map_err(|_| GatewayError::Decryption)?;
        let payload: RelayPayload =
            serde_json::from_value(plain.clone()).map_err(|_| GatewayError::Decryption)?;

        Ok(DecodedEnvelope { payload, plain })
    }

    /// Reject replayed or stale payloads before any backend work.
    pub fn replay_check(&self, payload: &RelayPayload) -> Result<()> {
        if let (Some(timestamp), Some(nonce)) = (payload.timestamp, payload.nonce.as_deref()) {
            self.replay.check(timestamp, nonce)?;
        }
        Ok(())
    }

    /// Full relay: decode, forward, re-encrypt.
    pub async fn relay(
        &self,
        raw: &[u8],
        tail: &str,
        cookie_header: Option<&str>,
    ) -> Result<RelayOutcome> {
        let decoded = self.decode_envelope(raw)?;
        self.forward(&decoded.payload, tail, cookie_header).await
    }

    /// Forward a decoded payload to `{backend}/API{tail}`.
    pub async fn forward(
        &self,
        payload: &RelayPayload,
        tail: &str,
        cookie_header: Option<&str>,
    ) -> Result<RelayOutcome> {
        self.replay_check(payload)?;

        let secret = self
            .shared_secret
            .as_deref()
            .ok_or(GatewayError::MissingSharedSecret)?;

        let method = payload
            .method
            .as_deref()
            .unwrap_or("POST")
            .to_ascii_uppercase();

        // The signed path and the called path must be the same bytes,
        // query string included
        let query_string = match payload.query.as_ref().filter(|q| !q.is_empty()) {
            Some(query) => Some(
                serde_urlencoded::to_string(query)
                    .map_err(|_| GatewayError::BadRequest("unserializable query".into()))?,
            ),
            None => None,
        };
        let signed_path = match &query_string {
            Some(qs) => format!("/API{}?{}", tail, qs),
            None => format!("/API{}", tail),
        };
        let url = format!("{}{}", self.backend_base, signed_path);

        // Same rule for the body: the serialization that is signed is the
        // serialization that is sent
        let body_str = if method != "GET" {
            match &payload.body {
                Some(body) => serde_json::to_string(body)?,
                None => String::new(),
            }
        } else {
            String::new()
        };

        let signed = SignedHeaders::for_request(
            &method,
            &signed_path,
            &body_str,
            payload.timestamp,
            payload.nonce.clone(),
            secret,
        )?;

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| GatewayError::BadRequest("invalid method".into()))?;

        debug!(%method, url = %url, "Relaying signed request to backend");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");
        for (name, value) in signed.as_pairs() {
            request = request.header(name, value);
        }
        if let Some(cookie) = cookie_header {
            request = request.header("Cookie", cookie);
        }
        if method != reqwest::Method::GET && !body_str.is_empty() {
            request = request.body(body_str);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;

        let status =
            StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let is_json = content_type.contains("application/json");

        let set_cookies: Vec<String> = response
            .headers()
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| ensure_same_site(v, SameSite::Lax))
            .collect();

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;

        // Encrypted response only for JSON bodies and only when the caller
        // supplied an ephemeral key
        if is_json {
            let plain_json: Value = serde_json::from_slice(&body_bytes)
                .map_err(|e| GatewayError::BackendUnavailable(format!("invalid backend JSON: {}", e)))?;

            if let Some(pem) = payload.client_public_key_pem.as_deref() {
                let body = self.seal_for_client(&plain_json, pem)?;
                return Ok(RelayOutcome {
                    status,
                    content_type: "application/json".to_string(),
                    body,
                    set_cookies,
                    plain_json: Some(plain_json),
                });
            }

            return Ok(RelayOutcome {
                status,
                content_type: "application/json".to_string(),
                body: body_bytes.to_vec(),
                set_cookies,
                plain_json: Some(plain_json),
            });
        }

        if payload.client_public_key_pem.is_some() {
            debug!("Non-JSON backend response; returning it unencrypted");
        }

        Ok(RelayOutcome {
            status,
            content_type: if content_type.is_empty() {
                "text/plain".to_string()
            } else {
                content_type
            },
            body: body_bytes.to_vec(),
            set_cookies,
            plain_json: None,
        })
    }

    /// Wrap a JSON document in an envelope addressed to the caller's
    /// ephemeral public key.
    pub fn seal_for_client(&self, json: &Value, client_pem: &str) -> Result<Vec<u8>> {
        let client_key = RsaPublicKey::from_public_key_pem(client_pem).map_err(|e| {
            warn!("Client ephemeral public key unusable: {}", e);
            GatewayError::BadRequest("invalid client public key".into())
        })?;

        let plain = serde_json::to_string(json)?;
        let envelope = envelope::seal(plain.as_bytes(), &client_key)?;
        Ok(serde_json::to_vec(&envelope)?)
    }
}
