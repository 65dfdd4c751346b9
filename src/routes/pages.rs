//! Gated page proxy
//!
//! Every non-API path goes through the access gate, then — when allowed —
//! is forwarded to the UI upstream that renders the actual pages. The
//! gateway contributes identity and policy, nothing about page content.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::gate::{self, Decision};
use crate::server::AppState;

pub async fn handle_page_request(
    state: Arc<AppState>,
    path: &str,
    query: Option<&str>,
    cookie_header: Option<&str>,
    peer: IpAddr,
) -> Response<Full<Bytes>> {
    let identity = state.cookies.read(cookie_header);

    match gate::decide(path, identity.as_ref(), peer) {
        Decision::Redirect(target) => {
            debug!(path, target, "Gate redirect");
            redirect_response(target)
        }
        Decision::Allow => forward_page_request(state, path, query, cookie_header).await,
    }
}

fn redirect_response(target: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::TEMPORARY_REDIRECT)
        .header("Location", target)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Forward an allowed page request to the UI upstream
async fn forward_page_request(
    state: Arc<AppState>,
    path: &str,
    query: Option<&str>,
    cookie_header: Option<&str>,
) -> Response<Full<Bytes>> {
    let target_url = match query {
        Some(query) => format!("{}{}?{}", state.args.ui_base(), path, query),
        None => format!("{}{}", state.args.ui_base(), path),
    };

    debug!(url = %target_url, "Forwarding page request to UI upstream");

    let mut builder = state.http.get(&target_url);
    if let Some(cookie) = cookie_header {
        builder = builder.header("Cookie", cookie);
    }

    match builder.send().await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::OK);
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("text/html")
                .to_string();

            match response.bytes().await {
                Ok(body) => Response::builder()
                    .status(status)
                    .header("Content-Type", content_type)
                    .body(Full::new(Bytes::from(body.to_vec())))
                    .unwrap(),
                Err(e) => {
                    warn!(error = %e, "Failed to read UI upstream response body");
                    bad_gateway("Failed to read UI response")
                }
            }
        }
        Err(e) => {
            warn!(error = %e, url = %target_url, "Failed to reach UI upstream");
            bad_gateway("Failed to connect to UI upstream")
        }
    }
}

fn bad_gateway(message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message });
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
