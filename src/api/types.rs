//! API request and response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ==================== Health ====================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Configured authentication schemes, in negotiation order.
    pub schemes: Vec<String>,
    /// Timestamp.
    pub timestamp: String,
}

// ==================== Authentication ====================

/// Username and password, as JSON.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    /// JWT token.
    pub token: String,
    pub principal: String,
    /// Token expiration in seconds.
    pub expires_in: i64,
}

/// The authenticated principal, merged across schemes.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrincipalInfo {
    pub principal: String,
    /// Scheme that authenticated the principal first.
    pub scheme: String,
    /// Roles granted by any authenticated scheme.
    pub roles: Vec<String>,
    /// Every scheme the principal is authenticated with.
    pub schemes: Vec<String>,
}

/// Request restored after a login, when it cannot be replayed by redirect.
#[derive(Debug, Serialize, ToSchema)]
pub struct ContinuationResponse {
    pub principal: String,
    pub scheme: String,
    pub method: String,
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

// ==================== Resources ====================

/// Protected resource.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceResponse {
    pub message: String,
    pub principal: String,
    /// Whether the principal holds the `admin` role.
    pub admin: bool,
}
