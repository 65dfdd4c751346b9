//! Gateway→backend HMAC credential.
//!
//! Every relayed request carries an HMAC-SHA256 signature over the
//! canonical string `METHOD|PATH|BODY|TIMESTAMP|NONCE`, keyed by a secret
//! shared only by the gateway and the backend. The exact body bytes that
//! are signed must be the bytes transmitted; the backend recomputes the
//! same concatenation and compares in constant time.
//!
//! The replay guard closes the envelope-replay gap: nonces are remembered
//! for a short TTL and timestamps outside the acceptance window are
//! rejected before any backend call is made.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

use crate::types::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Fixed algorithm tag carried next to the signature
pub const SIGNATURE_ALG: &str = "HMAC-SHA256";

/// Header carrying the base64 signature
pub const HEADER_SIGNATURE: &str = "X-Gateway-Signature";
/// Header carrying [`SIGNATURE_ALG`]
pub const HEADER_SIGNATURE_ALG: &str = "X-Gateway-Signature-Alg";
/// Header carrying the epoch-millisecond timestamp
pub const HEADER_TIMESTAMP: &str = "X-Gateway-Timestamp";
/// Header carrying the one-time nonce
pub const HEADER_NONCE: &str = "X-Gateway-Nonce";

/// Acceptance window for payload timestamps (±5 minutes)
pub const TIMESTAMP_WINDOW_MS: i64 = 300_000;

/// How long a nonce is remembered
const NONCE_TTL_MS: i64 = 5 * 60 * 1000;

/// Replay cache bound; a sweep runs when the cache grows past this
const NONCE_CACHE_MAX: usize = 100_000;

/// Build the canonical string that is signed and verified.
///
/// `path` includes the `/API` prefix and any serialized query string;
/// `body` is the exact serialization transmitted (empty for bodyless
/// requests).
pub fn canonical_string(
    method: &str,
    path: &str,
    body: &str,
    timestamp: i64,
    nonce: &str,
) -> String {
    [method, path, body, &timestamp.to_string(), nonce].join("|")
}

/// Sign a canonical string, returning the base64 signature.
pub fn sign(
    method: &str,
    path: &str,
    body: &str,
    timestamp: i64,
    nonce: &str,
    secret: &str,
) -> Result<String> {
    let canonical = canonical_string(method, path, body, timestamp, nonce);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::Internal("HMAC key setup failed".into()))?;
    mac.update(canonical.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verify a base64 signature against a recomputation. Constant-time.
pub fn verify(
    method: &str,
    path: &str,
    body: &str,
    timestamp: i64,
    nonce: &str,
    secret: &str,
    signature_base64: &str,
) -> Result<()> {
    let provided = BASE64
        .decode(signature_base64)
        .map_err(|_| GatewayError::Unauthenticated("invalid signature encoding".into()))?;

    let canonical = canonical_string(method, path, body, timestamp, nonce);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::Internal("HMAC key setup failed".into()))?;
    mac.update(canonical.as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| GatewayError::Unauthenticated("invalid signature".into()))
}

/// The four headers attached to a signed backend-bound request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub signature: String,
    pub algorithm: &'static str,
    pub timestamp: i64,
    pub nonce: String,
}

impl SignedHeaders {
    /// Sign an outbound request with timestamp/nonce taken from the caller
    /// when supplied, else freshly generated.
    pub fn for_request(
        method: &str,
        path: &str,
        body: &str,
        timestamp: Option<i64>,
        nonce: Option<String>,
        secret: &str,
    ) -> Result<Self> {
        let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
        let nonce = nonce.unwrap_or_else(generate_nonce);
        let signature = sign(method, path, body, timestamp, &nonce, secret)?;

        Ok(Self {
            signature,
            algorithm: SIGNATURE_ALG,
            timestamp,
            nonce,
        })
    }

    /// (name, value) pairs ready to attach to the outbound request
    pub fn as_pairs(&self) -> [(&'static str, String); 4] {
        [
            (HEADER_SIGNATURE, self.signature.clone()),
            (HEADER_SIGNATURE_ALG, self.algorithm.to_string()),
            (HEADER_TIMESTAMP, self.timestamp.to_string()),
            (HEADER_NONCE, self.nonce.clone()),
        ]
    }
}

/// Fresh 12-byte hex nonce
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Seen-nonce cache with a timestamp acceptance window.
///
/// A decrypted payload whose nonce was already presented inside the TTL,
/// or whose timestamp falls outside ±[`TIMESTAMP_WINDOW_MS`], is rejected
/// before the relay touches the backend.
pub struct ReplayGuard {
    seen: DashMap<String, i64>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// Check a payload's timestamp and nonce, recording the nonce.
    pub fn check(&self, timestamp: i64, nonce: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();

        if (now - timestamp).abs() > TIMESTAMP_WINDOW_MS {
            debug!(timestamp, "Envelope timestamp outside acceptance window");
            return Err(GatewayError::Decryption);
        }

        if self.seen.len() >= NONCE_CACHE_MAX {
            self.sweep(now);
        }

        match self.seen.entry(nonce.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if now - *entry.get() > NONCE_TTL_MS {
                    entry.insert(now);
                    Ok(())
                } else {
                    debug!("Replayed envelope nonce");
                    Err(GatewayError::Decryption)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(())
            }
        }
    }

    fn sweep(&self, now: i64) {
        self.seen.retain(|_, first_seen| now - *first_seen <= NONCE_TTL_MS);
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-shared-secret";

    #[test]
    fn test_canonical_string_layout() {
        let canonical = canonical_string("POST", "/API/login?x=1", "{\"a\":1}", 1700000000000, "abc");
        assert_eq!(canonical, "POST|/API/login?x=1|{\"a\":1}|1700000000000|abc");
    }

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign("POST", "/API/login", "{}", 1700000000000, "n1", SECRET).unwrap();
        let b = sign("POST", "/API/login", "{}", 1700000000000, "n1", SECRET).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_field_changes_signature() {
        let base = sign("POST", "/API/login", "{}", 1700000000000, "n1", SECRET).unwrap();
        assert_ne!(base, sign("GET", "/API/login", "{}", 1700000000000, "n1", SECRET).unwrap());
        assert_ne!(base, sign("POST", "/API/logout", "{}", 1700000000000, "n1", SECRET).unwrap());
        assert_ne!(base, sign("POST", "/API/login", "{\"b\":2}", 1700000000000, "n1", SECRET).unwrap());
        assert_ne!(base, sign("POST", "/API/login", "{}", 1700000000001, "n1", SECRET).unwrap());
        assert_ne!(base, sign("POST", "/API/login", "{}", 1700000000000, "n2", SECRET).unwrap());
        assert_ne!(base, sign("POST", "/API/login", "{}", 1700000000000, "n1", "other").unwrap());
    }

    #[test]
    fn test_verify_round_trip() {
        let sig = sign("GET", "/API/students?limit=5", "", 1700000000000, "n1", SECRET).unwrap();
        assert!(verify("GET", "/API/students?limit=5", "", 1700000000000, "n1", SECRET, &sig).is_ok());
        assert!(verify("GET", "/API/students?limit=6", "", 1700000000000, "n1", SECRET, &sig).is_err());
        assert!(verify("GET", "/API/students?limit=5", "", 1700000000000, "n1", "other", &sig).is_err());
    }

    #[test]
    fn test_verify_rejects_bad_encoding() {
        assert!(matches!(
            verify("GET", "/p", "", 0, "n", SECRET, "!!not-base64!!"),
            Err(GatewayError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_signed_headers_carry_four_fields() {
        let headers =
            SignedHeaders::for_request("POST", "/API/login", "{}", Some(1700000000000), Some("n1".into()), SECRET)
                .unwrap();
        let pairs = headers.as_pairs();
        assert_eq!(pairs[0].0, HEADER_SIGNATURE);
        assert_eq!(pairs[1], (HEADER_SIGNATURE_ALG, "HMAC-SHA256".to_string()));
        assert_eq!(pairs[2], (HEADER_TIMESTAMP, "1700000000000".to_string()));
        assert_eq!(pairs[3], (HEADER_NONCE, "n1".to_string()));
    }

    #[test]
    fn test_signed_headers_generate_missing_fields() {
        let headers = SignedHeaders::for_request("POST", "/API/login", "{}", None, None, SECRET).unwrap();
        assert_eq!(headers.nonce.len(), 24); // 12 bytes hex
        let now = Utc::now().timestamp_millis();
        assert!((now - headers.timestamp).abs() < 5_000);
    }

    #[test]
    fn test_replay_guard_rejects_duplicate_nonce() {
        let guard = ReplayGuard::new();
        let now = Utc::now().timestamp_millis();
        assert!(guard.check(now, "nonce-1").is_ok());
        assert!(matches!(guard.check(now, "nonce-1"), Err(GatewayError::Decryption)));
        assert!(guard.check(now, "nonce-2").is_ok());
    }

    #[test]
    fn test_replay_guard_rejects_stale_timestamp() {
        let guard = ReplayGuard::new();
        let now = Utc::now().timestamp_millis();
        assert!(guard.check(now - TIMESTAMP_WINDOW_MS - 1_000, "old").is_err());
        assert!(guard.check(now + TIMESTAMP_WINDOW_MS + 1_000, "future").is_err());
        assert!(guard.check(now - TIMESTAMP_WINDOW_MS + 1_000, "edge").is_ok());
    }
}
