//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling; one spawned task per
//! connection, no shared mutable state beyond the key cache and the replay
//! guard.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::accounts::AccountStore;
use crate::config::Args;
use crate::keys::KeyStore;
use crate::relay::SecureRelay;
use crate::routes;
use crate::session::{CookieCodec, CookieOptions};
use crate::types::GatewayError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Process-wide RSA key pair cache
    pub keys: Arc<KeyStore>,
    /// Envelope relay to the records backend
    pub relay: SecureRelay,
    /// Session cookie codec
    pub cookies: CookieCodec,
    /// Debug-mode accounts (empty outside auth debug)
    pub accounts: AccountStore,
    /// Client for UI upstream forwarding
    pub http: reqwest::Client,
    pub started: Instant,
}

impl AppState {
    pub fn new(args: Args) -> Self {
        let keys = match (&args.rsa_public_pem, &args.rsa_private_pem) {
            (Some(public_pem), Some(private_pem)) => Arc::new(KeyStore::from_pem(
                public_pem.clone(),
                private_pem.clone(),
            )),
            _ => Arc::new(KeyStore::new()),
        };

        Self::with_keys(args, keys)
    }

    /// State with an injected key store (tests supply a fixed pair)
    pub fn with_keys(args: Args, keys: Arc<KeyStore>) -> Self {
        let relay = SecureRelay::new(
            args.backend_base().to_string(),
            args.gateway_shared_secret.clone(),
            Arc::clone(&keys),
        );
        let cookies = CookieCodec::new(CookieOptions {
            secure: args.cookie_secure,
            same_site: args.cookie_samesite,
            domain: args.cookie_domain.clone(),
        });
        let accounts = if args.auth_debug {
            AccountStore::load(&args.accounts_file)
        } else {
            AccountStore::default()
        };

        Self {
            args,
            keys,
            relay,
            cookies,
            accounts,
            http: reqwest::Client::new(),
            started: Instant::now(),
        }
    }
}

/// Bind the configured listen address and serve forever.
pub async fn run(state: Arc<AppState>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Registrar gateway listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    serve(listener, state).await
}

/// Serve connections from an already-bound listener.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), GatewayError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());
    let cookie_header = req
        .headers()
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probes
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        // Gateway public key retrieval; clients call this before sealing
        (Method::GET, "/API/public-key") => routes::handle_public_key(Arc::clone(&state)),

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // Login: envelope in, session cookie out
        (Method::POST, "/API/login") => {
            return Ok(routes::handle_login(req, Arc::clone(&state)).await);
        }

        // Logout: clear the session cookie, no backend call
        (Method::POST, "/API/logout") => routes::handle_logout(Arc::clone(&state)),

        // Everything else under /API/ is a secure relay call
        (Method::POST, p) if p.starts_with("/API/") => {
            let tail = p.strip_prefix("/API").unwrap_or(p).to_string();
            return Ok(routes::handle_secure_relay(req, Arc::clone(&state), &tail).await);
        }

        // The API namespace is envelope-only on this surface
        (_, p) if p.starts_with("/API") => not_found_response(p),

        // Page routes: access gate, then the UI upstream
        _ => {
            routes::handle_page_request(
                Arc::clone(&state),
                &path,
                query.as_deref(),
                cookie_header.as_deref(),
                addr.ip(),
            )
            .await
        }
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
