//! HTTP request handlers.

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use futures::future::join_all;

use crate::api::types::*;
use crate::api::AppState;
use crate::error::{AuthnError, AuthnResult};
use crate::exchange::RequestState;
use crate::security::{CompositeAccessControl, Credentials, RequestSecurity};

/// Authenticate with every negotiated scheme and merge the results.
async fn authenticated(security: &RequestSecurity) -> AuthnResult<CompositeAccessControl> {
    let multi = security.multi();
    multi.authenticate(None, None).await?;
    multi.access_control().await
}

/// Credentials from the `Authorization` header, a JSON body or a form body.
fn submitted_credentials(request: &RequestState) -> Option<Credentials> {
    if let Some(credentials) = Credentials::from_request(request) {
        return Some(credentials);
    }

    let is_json = request
        .header("content-type")
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.essence_str() == mime::APPLICATION_JSON.essence_str());
    if is_json {
        let login: LoginRequest = serde_json::from_slice(&request.body).ok()?;
        return Some(Credentials::Form {
            username: login.username,
            password: login.password,
        });
    }

    Credentials::from_form(&request.body)
}

/// Health check endpoint.
///
/// GET /v1/health
#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schemes: state.registry.names(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// A resource requiring authentication with any negotiated scheme.
///
/// GET /v1/resource
#[utoipa::path(
    get,
    path = "/v1/resource",
    responses(
        (status = 200, description = "Resource", body = ResourceResponse),
        (status = 303, description = "Redirect to the login page"),
        (status = 401, description = "Challenge in WWW-Authenticate")
    ),
    security((), ("basic_auth" = []), ("bearer_auth" = [])),
    tag = "resources"
)]
pub async fn get_resource(
    Extension(security): Extension<RequestSecurity>,
) -> AuthnResult<Json<ResourceResponse>> {
    let access = authenticated(&security).await?;

    Ok(Json(ResourceResponse {
        message: format!("Hello, {}", access.principal()),
        principal: access.principal().to_string(),
        admin: access.has_role("admin"),
    }))
}

/// Get the authenticated principal.
///
/// GET /v1/me
#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Current principal", body = PrincipalInfo),
        (status = 401, description = "Not authenticated")
    ),
    security((), ("basic_auth" = []), ("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn get_current_user(
    Extension(security): Extension<RequestSecurity>,
) -> AuthnResult<Json<PrincipalInfo>> {
    let access = authenticated(&security).await?;

    let roles: BTreeSet<&String> = access
        .controls()
        .iter()
        .flat_map(|control| control.roles.iter())
        .collect();

    Ok(Json(PrincipalInfo {
        principal: access.principal().to_string(),
        scheme: access.scheme().to_string(),
        roles: roles.into_iter().cloned().collect(),
        schemes: access
            .controls()
            .iter()
            .map(|control| control.scheme.clone())
            .collect(),
    }))
}

/// Log in with a scheme and continue the request that was challenged.
///
/// POST /v1/login/{scheme}
#[utoipa::path(
    post,
    path = "/v1/login/{scheme}",
    params(("scheme" = String, Path, description = "Configured scheme name")),
    request_body(content = LoginRequest, description = "JSON or form encoded credentials"),
    responses(
        (status = 303, description = "Login successful, replay the restored GET request"),
        (status = 200, description = "Login successful", body = ContinuationResponse),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "No request was waiting for this login")
    ),
    tag = "auth"
)]
pub async fn login(
    Path(scheme): Path<String>,
    Extension(security): Extension<RequestSecurity>,
) -> AuthnResult<Response> {
    let continuation = security.continuation(&scheme)?;

    let credentials = submitted_credentials(&security.exchange().request()).ok_or_else(|| {
        AuthnError::Http {
            status: 400,
            message: "Missing credentials".to_string(),
        }
    })?;
    let credentials = match continuation.context().security().credential_kind() {
        Some(kind) => credentials.into_kind(kind),
        None => credentials,
    };

    let access_control = continuation.login(credentials).await?;

    let restored = security.exchange().request().clone();
    if restored.method == "GET" {
        return Ok(Redirect::to(&restored.path).into_response());
    }

    Ok(Json(ContinuationResponse {
        principal: access_control.principal,
        scheme: access_control.scheme,
        method: restored.method,
        path: restored.path,
    })
    .into_response())
}

/// Log out of every scheme.
///
/// POST /v1/logout
#[utoipa::path(
    post,
    path = "/v1/logout",
    responses(
        (status = 200, description = "Logged out", body = LogoutResponse),
        (status = 500, description = "A scheme failed to log out")
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(security): Extension<RequestSecurity>,
) -> AuthnResult<Json<LogoutResponse>> {
    // Resolve remembered logins first so each scheme has something to clear
    join_all(
        security
            .contexts()
            .iter()
            .map(|context| context.authenticate(None, None)),
    )
    .await;

    let outcome = security.multi().logout(None).await;
    if let Some(escalation) = outcome.escalation {
        return Err(escalation.into());
    }

    Ok(Json(LogoutResponse {
        message: "Logged out".to_string(),
    }))
}

/// Issue a bearer token for a configured user.
///
/// POST /v1/auth/token
#[utoipa::path(
    post,
    path = "/v1/auth/token",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "No bearer scheme configured")
    ),
    tag = "auth"
)]
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AuthnResult<Json<TokenResponse>> {
    let jwt = state
        .jwt
        .as_ref()
        .ok_or_else(|| AuthnError::Config("no bearer scheme is configured".to_string()))?;

    let user = state
        .users
        .authenticate(&request.username, &request.password)
        .ok_or_else(|| {
            tracing::warn!(username = %request.username, "Failed token request");
            AuthnError::Http {
                status: 401,
                message: "Invalid username or password".to_string(),
            }
        })?;

    let token = jwt.generate_token(&user.access_control("token"))?;

    tracing::info!(username = %user.username, "Token issued");

    Ok(Json(TokenResponse {
        token,
        principal: user.username.clone(),
        expires_in: jwt.token_duration_hours() * 3600,
    }))
}
