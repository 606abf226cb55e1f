//! Route definitions for the API.

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::{handlers, security_layer, AppState};

/// Security scheme modifier for OpenAPI.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "basic_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            );
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health_check,
        handlers::get_resource,
        handlers::get_current_user,
        handlers::login,
        handlers::logout,
        handlers::issue_token,
    ),
    components(schemas(
        crate::api::types::HealthResponse,
        crate::api::types::LoginRequest,
        crate::api::types::TokenResponse,
        crate::api::types::PrincipalInfo,
        crate::api::types::ContinuationResponse,
        crate::api::types::LogoutResponse,
        crate::api::types::ResourceResponse,
        crate::security::AccessControl,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "resources", description = "Protected resources"),
        (name = "auth", description = "Login, logout and token endpoints"),
        (name = "health", description = "Health and status endpoints")
    ),
    info(
        title = "authn-gate API",
        version = "0.1.0",
        description = "Authentication orchestration - negotiated challenges and request replay after login",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes running inside a security exchange
    let secured_routes = Router::new()
        .route("/v1/resource", get(handlers::get_resource))
        .route("/v1/me", get(handlers::get_current_user))
        .route("/v1/login/:scheme", post(handlers::login))
        .route("/v1/logout", post(handlers::logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            security_layer,
        ));

    // Public routes (no session)
    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/auth/token", post(handlers::issue_token))
        .route("/api-docs/openapi.json", get(openapi));

    Router::new()
        .merge(secured_routes)
        .merge(public_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use tower::ServiceExt;

    use crate::schemes::{test_users, BasicSecurity, BearerSecurity, FormSecurity, JwtManager};
    use crate::security::{HttpSecurity, SecurityRegistry, MOMENTO_ATTRIBUTE};
    use crate::session::{MemorySessionStore, SessionStore};

    const COOKIE: &str = "authn_session";

    fn jwt() -> JwtManager {
        JwtManager::new("test-secret-key-12345", "authn-gate".to_string(), 1)
    }

    fn app(schemes: &[&str]) -> Router {
        app_with(schemes, Arc::new(MemorySessionStore::new()))
    }

    fn app_with(schemes: &[&str], sessions: Arc<dyn SessionStore>) -> Router {
        let users = Arc::new(test_users());
        let securities: Vec<Arc<dyn HttpSecurity>> = schemes
            .iter()
            .map(|name| -> Arc<dyn HttpSecurity> {
                match *name {
                    "basic" => Arc::new(BasicSecurity::new(
                        "basic",
                        "intranet",
                        vec!["text/html".to_string()],
                        Arc::clone(&users),
                    )),
                    "bearer" => Arc::new(BearerSecurity::new(
                        "bearer",
                        "api",
                        vec!["application/json".to_string()],
                        jwt(),
                    )),
                    _ => Arc::new(FormSecurity::new(
                        "form",
                        "/login",
                        vec!["text/html".to_string()],
                        Arc::clone(&users),
                    )),
                }
            })
            .collect();

        build_router(AppState {
            registry: Arc::new(SecurityRegistry::with_accept_negotiation(securities).unwrap()),
            sessions,
            users,
            jwt: Some(jwt()),
            cookie_name: COOKIE.to_string(),
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn header<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn session_cookie(response: &Response) -> String {
        header(response, header::SET_COOKIE)
            .and_then(|cookie| cookie.split(';').next())
            .unwrap()
            .to_string()
    }

    fn login_form(cookie: Option<&str>, username: &str, password: &str) -> Request<Body> {
        let mut builder = Request::post("/v1/login/form")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
            .body(Body::from(format!("username={username}&password={password}")))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = app(&["basic", "bearer"]);
        let response = send(&app, Request::get("/v1/health").body(Body::empty()).unwrap()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["schemes"], serde_json::json!(["basic", "bearer"]));
    }

    #[tokio::test]
    async fn test_json_client_challenged_with_bearer_only() {
        let app = app(&["basic", "bearer"]);
        let response = send(
            &app,
            Request::get("/v1/resource")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            header(&response, header::WWW_AUTHENTICATE),
            Some(r#"Bearer realm="api""#)
        );
        let body = json_body(response).await;
        assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn test_basic_credentials_grant_access() {
        let app = app(&["basic", "bearer"]);
        let authorization = format!("Basic {}", STANDARD.encode("alice:wonderland"));
        let response = send(
            &app,
            Request::get("/v1/resource")
                .header(header::ACCEPT, "text/html")
                .header(header::AUTHORIZATION, authorization)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["principal"], "alice");
        assert_eq!(body["admin"], true);
    }

    #[tokio::test]
    async fn test_token_then_bearer_access() {
        let app = app(&["basic", "bearer"]);
        let response = send(
            &app,
            Request::post("/v1/auth/token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"username":"bob","password":"builder"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = send(
            &app,
            Request::get("/v1/me")
                .header(header::ACCEPT, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["principal"], "bob");
        assert_eq!(body["scheme"], "bearer");
        assert_eq!(body["roles"], serde_json::json!(["member"]));
    }

    #[tokio::test]
    async fn test_rejected_token_reported_in_challenge() {
        let app = app(&["basic", "bearer"]);
        let response = send(
            &app,
            Request::get("/v1/resource")
                .header(header::ACCEPT, "application/json")
                .header(header::AUTHORIZATION, "Bearer forged")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(header(&response, header::WWW_AUTHENTICATE)
            .unwrap()
            .contains(r#"error="invalid_token""#));
    }

    #[tokio::test]
    async fn test_login_continues_challenged_request() {
        let app = app(&["form"]);

        // Challenge: redirected to the login page, original request captured
        let response = send(
            &app,
            Request::get("/v1/resource?tab=history")
                .header(header::ACCEPT, "text/html")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(header(&response, header::LOCATION), Some("/login"));
        let cookie = session_cookie(&response);

        // Login: sent back to the captured request
        let response = send(&app, login_form(Some(&cookie), "bob", "builder")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            header(&response, header::LOCATION),
            Some("/v1/resource?tab=history")
        );

        // Replay: the login is remembered in the session
        let response = send(
            &app,
            Request::get("/v1/resource?tab=history")
                .header(header::ACCEPT, "text/html")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["principal"], "bob");

        // Logout clears the remembered login
        let response = send(
            &app,
            Request::post("/v1/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            Request::get("/v1/resource")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_login_without_challenge_is_sequencing_error() {
        let app = app(&["form"]);
        let response = send(&app, login_form(None, "bob", "builder")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["code"],
            "CONTINUATION_WITHOUT_REQUEST"
        );
    }

    #[tokio::test]
    async fn test_failed_login_challenges_the_scheme() {
        let sessions = Arc::new(MemorySessionStore::new());
        let app = app_with(&["basic", "form"], sessions.clone());

        let session = sessions.open(None).await.unwrap();
        session.set_attribute("theme", b"dark".to_vec());
        sessions.commit(&session).await.unwrap();
        let cookie = format!("{COOKIE}={}", session.id());

        let authorization = format!("Basic {}", STANDARD.encode("alice:wrong"));
        let response = send(
            &app,
            Request::post("/v1/login/basic")
                .header(header::AUTHORIZATION, authorization)
                .header(header::COOKIE, &cookie)
                .body(Body::from("password=wrong"))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            header(&response, header::WWW_AUTHENTICATE),
            Some(r#"Basic realm="intranet", charset="UTF-8""#)
        );

        // The login submission is not kept for replay
        let stored = sessions.load(session.id()).await.unwrap().unwrap();
        assert!(!stored.contains_key(MOMENTO_ATTRIBUTE));
        assert_eq!(stored.get("theme"), Some(&b"dark".to_vec()));
    }

    #[tokio::test]
    async fn test_unsatisfiable_accept_is_config_error() {
        let app = app(&["basic", "bearer"]);
        let response = send(
            &app,
            Request::get("/v1/resource")
                .header(header::ACCEPT, "image/png")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["code"], "NO_NEGOTIATED_SCHEME");
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let app = app(&["basic"]);
        let response = send(
            &app,
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["paths"]["/v1/login/{scheme}"].is_object());
    }
}
