//! authn-gate - authentication orchestration for HTTP request pipelines.
//!
//! Each request gets one [`security::AuthenticationContext`] per configured
//! scheme. Contexts cache the outcome of authenticating, so every reader in
//! the request sees the same result. When a resource needs a login the
//! [`security::ChallengeOrchestrator`] saves the request in the session,
//! negotiates which schemes to challenge from the `Accept` header and writes
//! the combined challenge. After the login, [`security::LoginContinuation`]
//! puts the saved request back in place.

pub mod api;
pub mod config;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod schemes;
pub mod security;
pub mod session;
