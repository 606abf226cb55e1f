//! Error types for authn-gate.
//!
//! Defines a unified error type that maps cleanly to HTTP responses, and the
//! `Escalation` captured from scheme callbacks and replayed to later readers.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Fault raised by a scheme callback.
///
/// Escalations are cached by the authentication context and handed to every
/// reader of the authentication result, so they must be cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum Escalation {
    /// A request-level HTTP error. Passed through unchanged.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A runtime fault in the scheme. Passed through unchanged.
    #[error("Runtime fault: {0}")]
    Runtime(String),

    /// A fatal fault. Passed through unchanged.
    #[error("Fatal fault: {0}")]
    Fatal(String),

    /// Any other failure. Wrapped when rethrown.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Escalation {
    /// Wrap an arbitrary error as an escalation.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Escalation::Other(Arc::new(error))
    }
}

/// Unified error type for authn-gate operations.
#[derive(Debug, Error)]
pub enum AuthnError {
    /// Access control is required but not available. Names the scheme that
    /// must challenge when the failure is specific to one scheme.
    #[error("Authentication required{}", scheme_suffix(.scheme))]
    AuthenticationRequired { scheme: Option<String> },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Runtime fault: {0}")]
    Runtime(String),

    #[error("Fatal fault: {0}")]
    Fatal(String),

    #[error("Authentication escalation: {0}")]
    Escalation(Arc<dyn std::error::Error + Send + Sync>),

    #[error("No authentication scheme accepted the supplied credentials")]
    NoSchemeAcceptedCredentials,

    #[error("No authentication scheme negotiated for Accept '{accept}'")]
    NoNegotiatedScheme { accept: String },

    #[error("Unknown authentication scheme: {0}")]
    UnknownScheme(String),

    #[error("Login completed without a captured request to continue")]
    ContinuationWithoutRequest,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthnError {
    /// Authentication required without targeting a particular scheme.
    pub fn authentication_required() -> Self {
        AuthnError::AuthenticationRequired { scheme: None }
    }

    /// Authentication required, re-challenging exactly `scheme`.
    pub fn authentication_required_for(scheme: impl Into<String>) -> Self {
        AuthnError::AuthenticationRequired {
            scheme: Some(scheme.into()),
        }
    }
}

impl From<Escalation> for AuthnError {
    fn from(escalation: Escalation) -> Self {
        match escalation {
            Escalation::Http { status, message } => AuthnError::Http { status, message },
            Escalation::Runtime(msg) => AuthnError::Runtime(msg),
            Escalation::Fatal(msg) => AuthnError::Fatal(msg),
            Escalation::Other(source) => AuthnError::Escalation(source),
        }
    }
}

fn scheme_suffix(scheme: &Option<String>) -> String {
    scheme
        .as_ref()
        .map(|s| format!(" for scheme '{s}'"))
        .unwrap_or_default()
}

/// Attached to the response of [`AuthnError::AuthenticationRequired`] so the
/// security layer can challenge the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequired {
    pub scheme: Option<String>,
}

/// Error response body for API clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AuthnError {
    fn into_response(self) -> Response {
        let challenge = match &self {
            AuthnError::AuthenticationRequired { scheme } => Some(ChallengeRequired {
                scheme: scheme.clone(),
            }),
            _ => None,
        };

        let (status, code, message, details) = match &self {
            AuthnError::AuthenticationRequired { scheme } => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_REQUIRED",
                "Authentication required".to_string(),
                scheme.clone(),
            ),
            AuthnError::Http { status, message } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "HTTP_ERROR",
                message.clone(),
                None,
            ),
            AuthnError::Runtime(msg) | AuthnError::Fatal(msg) => {
                tracing::error!(error = %msg, "Authentication fault");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AUTHENTICATION_FAULT",
                    "An authentication fault occurred".to_string(),
                    None,
                )
            }
            AuthnError::Escalation(e) => {
                tracing::error!(error = %e, "Authentication escalation");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AUTHENTICATION_FAULT",
                    "An authentication fault occurred".to_string(),
                    None,
                )
            }
            AuthnError::NoSchemeAcceptedCredentials => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "NO_SCHEME_ACCEPTED_CREDENTIALS",
                "Configuration error".to_string(),
                Some(self.to_string()),
            ),
            AuthnError::NoNegotiatedScheme { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "NO_NEGOTIATED_SCHEME",
                "Configuration error".to_string(),
                Some(self.to_string()),
            ),
            AuthnError::UnknownScheme(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "UNKNOWN_SCHEME",
                "Configuration error".to_string(),
                Some(self.to_string()),
            ),
            AuthnError::ContinuationWithoutRequest => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONTINUATION_WITHOUT_REQUEST",
                "No request to continue after login".to_string(),
                None,
            ),
            AuthnError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Configuration error".to_string(),
                Some(msg.clone()),
            ),
            AuthnError::Database(e) => {
                // Log the actual error but don't expose internals
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            AuthnError::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SERIALIZATION_ERROR",
                    "Failed to process request state".to_string(),
                    None,
                )
            }
            AuthnError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(challenge) = challenge {
            response.extensions_mut().insert(challenge);
        }
        response
    }
}

/// Result type alias for authn-gate operations.
pub type AuthnResult<T> = Result<T, AuthnError>;
