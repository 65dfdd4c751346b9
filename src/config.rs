//! Configuration for the gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::session::SameSite;

/// Registrar Gateway - secure request gateway for the student records system
#[derive(Parser, Debug, Clone)]
#[command(name = "registrar-gateway")]
#[command(about = "Encrypting relay between the records UI and the records backend")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Records backend base URL; relayed calls go to {backend}/API/*
    #[arg(long, env = "BACKEND_URL", default_value = "http://127.0.0.1:3335")]
    pub backend_url: String,

    /// UI upstream base URL; allowed page requests are proxied here
    #[arg(long, env = "UI_URL", default_value = "http://127.0.0.1:3001")]
    pub ui_url: String,

    /// Shared secret for the gateway→backend HMAC credential
    /// (required unless auth debug mode handles logins locally)
    #[arg(long, env = "GATEWAY_SHARED_SECRET")]
    pub gateway_shared_secret: Option<String>,

    /// RSA public key PEM (SPKI). When both PEM vars are set the pair is
    /// loaded verbatim instead of generated.
    #[arg(long, env = "SERVER_RSA_PUBLIC_PEM", hide_env_values = true)]
    pub rsa_public_pem: Option<String>,

    /// RSA private key PEM (PKCS#8)
    #[arg(long, env = "SERVER_RSA_PRIVATE_PEM", hide_env_values = true)]
    pub rsa_private_pem: Option<String>,

    /// Mark session cookies Secure (leave off only for local development)
    #[arg(long, env = "COOKIE_SECURE", action = clap::ArgAction::Set, default_value_t = true)]
    pub cookie_secure: bool,

    /// SameSite attribute for session cookies (lax, strict, none)
    #[arg(long, env = "COOKIE_SAMESITE", default_value = "lax")]
    pub cookie_samesite: SameSite,

    /// Optional Domain attribute for session cookies
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Resolve logins against the local accounts file instead of the backend
    #[arg(long, env = "AUTH_DEBUG", action = clap::ArgAction::Set, default_value_t = false)]
    pub auth_debug: bool,

    /// Path of the local accounts file used in auth debug mode
    #[arg(long, env = "ACCOUNTS_FILE", default_value = "test_accounts.json")]
    pub accounts_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Backend base with any trailing slash removed
    pub fn backend_base(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    /// UI upstream base with any trailing slash removed
    pub fn ui_base(&self) -> &str {
        self.ui_url.trim_end_matches('/')
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.auth_debug && self.gateway_shared_secret.is_none() {
            return Err(
                "GATEWAY_SHARED_SECRET is required unless AUTH_DEBUG is enabled".to_string(),
            );
        }

        if self.rsa_public_pem.is_some() != self.rsa_private_pem.is_some() {
            return Err(
                "SERVER_RSA_PUBLIC_PEM and SERVER_RSA_PRIVATE_PEM must be set together"
                    .to_string(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["registrar-gateway", "--gateway-shared-secret", "s3cret"])
    }

    #[test]
    fn test_defaults() {
        let args = base_args();
        assert_eq!(args.backend_base(), "http://127.0.0.1:3335");
        assert_eq!(args.cookie_samesite, SameSite::Lax);
        assert!(args.cookie_secure);
        assert!(!args.auth_debug);
    }

    #[test]
    fn test_validate_requires_secret_outside_debug() {
        let args = Args::parse_from(["registrar-gateway"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["registrar-gateway", "--auth-debug", "true"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_half_configured_pem() {
        let mut args = base_args();
        args.rsa_public_pem = Some("-----BEGIN PUBLIC KEY-----".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let mut args = base_args();
        args.backend_url = "http://records.internal/".to_string();
        assert_eq!(args.backend_base(), "http://records.internal");
    }
}
