//! Registrar Gateway - secure request gateway for the student records system
//!
//! The gateway sits between the browser and the records backend. Clients
//! never send plaintext requests: each call travels inside a hybrid
//! encryption envelope (RSA-OAEP key wrap over AES-256-GCM), and the
//! gateway re-authenticates the relayed call to the backend with an
//! HMAC-SHA256 credential over a canonical request string. Identity rides
//! in a session cookie the gateway issues, reads, and revokes; page routes
//! are gated by a static role policy before reaching the UI upstream.
//!
//! ## Services
//!
//! - **Public key retrieval**: `GET /API/public-key`
//! - **Secure relay**: `POST /API/*` envelope endpoints
//! - **Login/logout**: session cookie issuance and revocation
//! - **Access gate**: role policy over page routes, applied before the UI
//!   upstream is consulted

pub mod accounts;
pub mod config;
pub mod envelope;
pub mod gate;
pub mod keys;
pub mod relay;
pub mod routes;
pub mod server;
pub mod session;
pub mod signing;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
