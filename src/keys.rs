//! Gateway RSA key pair management.
//!
//! The gateway owns one long-lived RSA-2048 pair for the lifetime of the
//! process. Clients wrap their per-call content keys for the public half
//! (OAEP/SHA-256); the private half never leaves this module's owner.
//!
//! The pair is either loaded verbatim from configured PEM material or
//! generated lazily on the first request that needs it. Concurrent first
//! calls are serialized by a once-cell so two requests can never observe
//! different pairs.

use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;

use crate::types::{GatewayError, Result};

/// RSA modulus size in bits
pub const RSA_BITS: usize = 2048;

/// The gateway's asymmetric pair plus its exported public PEM.
#[derive(Debug, Clone)]
pub struct RsaKeyPair {
    pub public_key: RsaPublicKey,
    pub private_key: RsaPrivateKey,
    /// SPKI PEM of `public_key`, served on the retrieval endpoint
    pub public_key_pem: String,
}

impl RsaKeyPair {
    /// Generate a fresh RSA-2048 pair using the OS RNG.
    pub fn generate() -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
            .map_err(|e| GatewayError::KeyGeneration(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| GatewayError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            public_key,
            private_key,
            public_key_pem,
        })
    }

    /// Load a pair from SPKI public and PKCS#8 private PEM material.
    pub fn from_pem(public_pem: &str, private_pem: &str) -> Result<Self> {
        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| GatewayError::Config(format!("Invalid RSA public PEM: {}", e)))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| GatewayError::Config(format!("Invalid RSA private PEM: {}", e)))?;

        Ok(Self {
            public_key,
            private_key,
            public_key_pem: public_pem.to_string(),
        })
    }
}

/// Process-wide key pair cache.
///
/// Holds configured PEM material (if any) and initializes the pair at most
/// once. Tests inject a fixed pair with [`KeyStore::fixed`] instead of
/// paying for generation per test.
pub struct KeyStore {
    configured: Option<(String, String)>,
    pair: OnceCell<RsaKeyPair>,
}

impl KeyStore {
    /// Key store that generates a pair on first use.
    pub fn new() -> Self {
        Self {
            configured: None,
            pair: OnceCell::new(),
        }
    }

    /// Key store that loads the given PEM material on first use.
    pub fn from_pem(public_pem: String, private_pem: String) -> Self {
        Self {
            configured: Some((public_pem, private_pem)),
            pair: OnceCell::new(),
        }
    }

    /// Key store pre-seeded with a fixed pair (tests).
    pub fn fixed(pair: RsaKeyPair) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(pair);
        Self {
            configured: None,
            pair: cell,
        }
    }

    /// Get the process key pair, initializing it on first call.
    ///
    /// Thread-safe: concurrent first calls block on the same
    /// initialization and all observe the same pair.
    pub fn get(&self) -> Result<&RsaKeyPair> {
        self.pair.get_or_try_init(|| match &self.configured {
            Some((public_pem, private_pem)) => {
                let pair = RsaKeyPair::from_pem(public_pem, private_pem)?;
                info!("Loaded RSA key pair from configured PEM material");
                Ok(pair)
            }
            None => {
                info!("Generating RSA-{} gateway key pair", RSA_BITS);
                RsaKeyPair::generate()
            }
        })
    }

    /// PEM of the public half, for the retrieval endpoint.
    pub fn public_key_pem(&self) -> Result<&str> {
        Ok(self.get()?.public_key_pem.as_str())
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_pair() -> &'static RsaKeyPair {
        static PAIR: OnceCell<RsaKeyPair> = OnceCell::new();
        PAIR.get_or_init(|| RsaKeyPair::generate().unwrap())
    }

    #[test]
    fn test_get_is_idempotent() {
        let store = KeyStore::fixed(test_pair().clone());
        let first = store.get().unwrap().public_key_pem.clone();
        let second = store.get().unwrap().public_key_pem.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_first_call_yields_one_pair() {
        let store = Arc::new(KeyStore::fixed(test_pair().clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.get().unwrap().public_key_pem.clone())
            })
            .collect();

        let pems: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(pems.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_pem_round_trip() {
        let pair = test_pair();
        let private_pem = {
            use rsa::pkcs8::EncodePrivateKey;
            pair.private_key.to_pkcs8_pem(LineEnding::LF).unwrap()
        };

        let loaded = RsaKeyPair::from_pem(&pair.public_key_pem, &private_pem).unwrap();
        assert_eq!(loaded.public_key, pair.public_key);
        assert_eq!(loaded.public_key_pem, pair.public_key_pem);
    }

    #[test]
    fn test_bad_pem_is_config_error() {
        let store = KeyStore::from_pem("not a pem".into(), "also not a pem".into());
        match store.get() {
            Err(GatewayError::Config(_)) => {}
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_public_pem_has_spki_markers() {
        let pem = test_pair().public_key_pem.as_str();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
    }
}
