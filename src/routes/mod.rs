//! HTTP routes for the gateway

pub mod auth;
pub mod health;
pub mod pages;
pub mod public_key;
pub mod secure;

pub use auth::{handle_login, handle_logout};
pub use health::{health_check, version_info};
pub use pages::handle_page_request;
pub use public_key::handle_public_key;
pub use secure::handle_secure_relay;
