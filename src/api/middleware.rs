//! Security middleware for axum.
//!
//! Wraps each request in an [`Exchange`] backed by the client's session,
//! exposes its [`RequestSecurity`] to handlers, and answers "authentication
//! required" with a challenge.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::AppState;
use crate::error::{AuthnError, AuthnResult, ChallengeRequired};
use crate::exchange::{ConnectionState, Exchange, RequestState, ResponseState};

/// Largest request body kept for replay after login.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn security_layer(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match secure(state, request, next).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn secure(state: AppState, request: Request<Body>, next: Next) -> AuthnResult<Response> {
    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AuthnError::Http {
            status: 400,
            message: format!("Unreadable request body: {e}"),
        })?;

    let session_id = session_cookie(&parts.headers, &state.cookie_name);
    let session = state.sessions.open(session_id.as_deref()).await?;

    let path = parts
        .uri
        .path_and_query()
        .map_or("/", |p| p.as_str())
        .to_string();
    let connection = ConnectionState {
        secure: is_secure(&parts.uri, &parts.headers),
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.to_string()),
    };
    let exchange = Exchange::new(
        connection,
        RequestState::from_http(&parts.method, &path, &parts.headers, bytes.to_vec()),
        session.clone(),
    );

    let security = state.registry.for_exchange(Arc::clone(&exchange));
    parts.extensions.insert(security.clone());

    let mut response = next.run(Request::from_parts(parts, Body::from(bytes))).await;

    if let Some(required) = response.extensions().get::<ChallengeRequired>().cloned() {
        response = match security
            .orchestrator()
            .challenge(required.scheme.as_deref())
            .await
        {
            Ok(_) => apply_challenge(exchange.take_response(), response),
            Err(e) => e.into_response(),
        };
    }

    // Scheme completions may still be writing to the session
    exchange.flights().wait_idle().await;

    if session.is_new() && session.snapshot().is_empty() {
        return Ok(response);
    }
    state.sessions.commit(&session).await?;

    if session.is_new() {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            state.cookie_name,
            session.id()
        );
        if exchange.connection().secure {
            cookie.push_str("; Secure");
        }
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "Could not set session cookie"),
        }
    }

    Ok(response)
}

/// Status and headers written by the challenge, over the handler's body.
fn apply_challenge(written: ResponseState, original: Response) -> Response {
    if !written.is_written() {
        return original;
    }
    let challenge = written.into_response();
    let (mut parts, body) = original.into_parts();
    parts.status = challenge.status();
    for (name, value) in challenge.headers() {
        if name != header::CONTENT_LENGTH && name != header::CONTENT_TYPE {
            parts.headers.append(name.clone(), value.clone());
        }
    }
    Response::from_parts(parts, body)
}

fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn is_secure(uri: &Uri, headers: &HeaderMap) -> bool {
    uri.scheme_str() == Some("https")
        || headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; authn_session=abc-123; lang=en"),
        );

        assert_eq!(
            session_cookie(&headers, "authn_session"),
            Some("abc-123".to_string())
        );
        assert_eq!(session_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_forwarded_proto_is_secure() {
        let mut headers = HeaderMap::new();
        let uri: Uri = "/v1/resource".parse().unwrap();
        assert!(!is_secure(&uri, &headers));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("HTTPS"));
        assert!(is_secure(&uri, &headers));
    }

    #[test]
    fn test_apply_challenge_keeps_body() {
        let mut written = ResponseState::default();
        written.set_status(401);
        written.set_header("www-authenticate", r#"Basic realm="x""#);

        let original = AuthnError::authentication_required().into_response();
        let response = apply_challenge(written, original);

        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            r#"Basic realm="x""#
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
