//! HTTP API layer for authn-gate.
//!
//! Provides a protected demo resource and the login, logout and token
//! endpoints driving the security core.

pub mod handlers;
mod middleware;
mod routes;
mod types;

pub use middleware::security_layer;
pub use routes::{build_router, ApiDoc};

use std::sync::Arc;

use crate::schemes::{JwtManager, UserStore};
use crate::security::SecurityRegistry;
use crate::session::SessionStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configured authentication schemes.
    pub registry: Arc<SecurityRegistry>,
    /// Session persistence.
    pub sessions: Arc<dyn SessionStore>,
    /// Users known to the password based schemes.
    pub users: Arc<UserStore>,
    /// Token issuer, when a bearer scheme is configured.
    pub jwt: Option<JwtManager>,
    /// Name of the session cookie.
    pub cookie_name: String,
}
