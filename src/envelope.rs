//! Hybrid encryption envelope shared by client and gateway.
//!
//! # Algorithms
//!
//! - **Key wrap**: RSA-OAEP with SHA-256 over a one-time 256-bit content key
//! - **Payload**: AES-256-GCM over the UTF-8 JSON document
//! - **Plaintext MAC**: HMAC-SHA256 keyed by the content key (optional on
//!   the wire, always produced by [`seal`])
//!
//! RSA alone cannot carry arbitrary JSON, so each call wraps a fresh
//! symmetric key; a fresh key per envelope also rules out nonce reuse
//! against a long-lived symmetric key.
//!
//! On the wire every binary field travels base64-encoded inside a JSON
//! object. The GCM tag is carried separately from the ciphertext.
//!
//! [`open`] reports every failure as the single opaque
//! [`GatewayError::Decryption`]: which of the checks tripped is nobody's
//! business but ours.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::types::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Content key length (AES-256)
pub const CONTENT_KEY_LEN: usize = 32;

/// GCM nonce length
pub const IV_LEN: usize = 12;

/// GCM auth tag length
pub const TAG_LEN: usize = 16;

/// Wire form of an encrypted envelope.
///
/// Field presence is validated at the decode boundary; anything that is
/// not an object with the four required base64 strings never reaches the
/// relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Content key wrapped with RSA-OAEP under the recipient's public key
    pub encrypted_key_base64: String,
    /// 12-byte GCM nonce
    pub iv_base64: String,
    /// AES-256-GCM ciphertext (tag excluded)
    pub ciphertext_base64: String,
    /// 16-byte GCM auth tag
    pub tag_base64: String,
    /// HMAC-SHA256 over the plaintext, keyed by the content key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig_base64: Option<String>,
}

impl EncryptedEnvelope {
    /// Check whether a decoded JSON value has the envelope shape.
    pub fn is_envelope(value: &serde_json::Value) -> bool {
        ["encryptedKeyBase64", "ivBase64", "ciphertextBase64", "tagBase64"]
            .iter()
            .all(|field| value.get(field).map(|v| v.is_string()).unwrap_or(false))
    }
}

/// Encrypt a JSON document for `recipient`.
///
/// Generates a fresh content key and IV, encrypts the plaintext with
/// AES-256-GCM, wraps the key with RSA-OAEP/SHA-256, and signs the
/// plaintext with HMAC-SHA256 under the content key.
pub fn seal(plaintext: &[u8], recipient: &RsaPublicKey) -> Result<EncryptedEnvelope> {
    let mut content_key = [0u8; CONTENT_KEY_LEN];
    OsRng.fill_bytes(&mut content_key);
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&content_key));
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| GatewayError::Internal("AES-GCM encryption failed".into()))?;

    // AEAD output is ciphertext || tag; the wire format carries them apart
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    let ciphertext = sealed;

    let encrypted_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &content_key)
        .map_err(|_| GatewayError::Internal("RSA-OAEP key wrap failed".into()))?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&content_key)
        .map_err(|_| GatewayError::Internal("HMAC key setup failed".into()))?;
    mac.update(plaintext);
    let sig = mac.finalize().into_bytes();

    content_key.zeroize();

    Ok(EncryptedEnvelope {
        encrypted_key_base64: BASE64.encode(encrypted_key),
        iv_base64: BASE64.encode(iv),
        ciphertext_base64: BASE64.encode(&ciphertext),
        tag_base64: BASE64.encode(&tag),
        sig_base64: Some(BASE64.encode(sig)),
    })
}

/// Decrypt an envelope with the recipient's private key.
///
/// Fails if the wrapped key does not unwrap, the unwrapped key is not 32
/// bytes, the GCM tag does not verify, or a present plaintext signature
/// does not verify. The GCM tag is checked before the plaintext is handed
/// to any parser. All failures collapse to [`GatewayError::Decryption`].
pub fn open(envelope: &EncryptedEnvelope, private_key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let encrypted_key = decode_field(&envelope.encrypted_key_base64)?;
    let iv = decode_field(&envelope.iv_base64)?;
    let ciphertext = decode_field(&envelope.ciphertext_base64)?;
    let tag = decode_field(&envelope.tag_base64)?;

    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(GatewayError::Decryption);
    }

    let mut content_key = private_key
        .decrypt(Oaep::new::<Sha256>(), &encrypted_key)
        .map_err(|_| GatewayError::Decryption)?;

    if content_key.len() != CONTENT_KEY_LEN {
        content_key.zeroize();
        return Err(GatewayError::Decryption);
    }

    // GCM wants ciphertext || tag back together
    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&content_key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), combined.as_slice())
        .map_err(|_| GatewayError::Decryption);

    let plaintext = match plaintext {
        Ok(p) => p,
        Err(e) => {
            content_key.zeroize();
            return Err(e);
        }
    };

    // Independent defense-in-depth check on top of the GCM tag
    if let Some(sig_base64) = &envelope.sig_base64 {
        let sig = decode_field(sig_base64);
        let verified = sig.and_then(|sig| {
            let mut mac = <HmacSha256 as Mac>::new_from_slice(&content_key)
                .map_err(|_| GatewayError::Decryption)?;
            mac.update(&plaintext);
            mac.verify_slice(&sig).map_err(|_| GatewayError::Decryption)
        });
        if let Err(e) = verified {
            content_key.zeroize();
            return Err(e);
        }
    }

    content_key.zeroize();
    Ok(plaintext)
}

fn decode_field(value: &str) -> Result<Vec<u8>> {
    BASE64.decode(value).map_err(|_| GatewayError::Decryption)
}
