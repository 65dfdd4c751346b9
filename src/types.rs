//! Error types for the gateway

use hyper::StatusCode;

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// RSA key generation or key material loading failed. Fatal; the
    /// gateway cannot terminate client encryption without a key pair.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Envelope could not be opened. Deliberately carries no detail about
    /// which check failed; callers surface it as a generic client error.
    #[error("Decryption failed")]
    Decryption,

    /// No shared secret configured for the gateway→backend HMAC credential.
    /// Signing is never silently skipped.
    #[error("Missing gateway shared secret")]
    MissingSharedSecret,

    /// The backend could not be reached or did not produce a response.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::KeyGeneration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Decryption => StatusCode::BAD_REQUEST,
            Self::MissingSharedSecret => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Cryptographic and backend failures are collapsed to fixed strings so
    /// the response never acts as a decryption oracle.
    pub fn public_message(&self) -> String {
        match self {
            Self::Decryption | Self::BadRequest(_) => "invalid request".to_string(),
            Self::BackendUnavailable(_) => "backend unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::Decryption.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::MissingSharedSecret.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::BackendUnavailable("refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Unauthorized("role".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_decryption_message_is_generic() {
        // The caller-visible message must not say which check failed
        assert_eq!(GatewayError::Decryption.public_message(), "invalid request");
        assert_eq!(
            GatewayError::BadRequest("tag mismatch at byte 7".into()).public_message(),
            "invalid request"
        );
    }
}
