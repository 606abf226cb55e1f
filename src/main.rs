//! authn-gate server.
//!
//! Serves a protected resource behind the configured authentication schemes.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePool;
use tokio::net::TcpListener;

use authn_gate::api::{build_router, AppState};
use authn_gate::config::{Config, SessionBackend};
use authn_gate::logging;
use authn_gate::schemes::{build_securities, JwtManager, UserStore};
use authn_gate::security::SecurityRegistry;
use authn_gate::session::{MemorySessionStore, SessionStore, SqliteSessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: No .env file loaded ({e})");
    }

    logging::init();

    tracing::info!("Starting authn-gate v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;
    config.security.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid security configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        schemes = config.security.schemes.len(),
        users = config.security.users.len(),
        "Configuration loaded"
    );

    let sessions: Arc<dyn SessionStore> = match config.session.store {
        SessionBackend::Memory => {
            tracing::warn!("Sessions are kept in memory and lost on restart");
            Arc::new(MemorySessionStore::new())
        }
        SessionBackend::Sqlite => {
            let pool = SqlitePool::connect(&config.session.database_url)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to session database");
                    anyhow::anyhow!("Database connection error: {}", e)
                })?;

            let store = SqliteSessionStore::new(pool);
            store.init_schema().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to initialize session schema");
                anyhow::anyhow!("Schema initialization error: {}", e)
            })?;

            tracing::info!(database = %config.session.database_url, "Session database ready");
            Arc::new(store)
        }
    };

    let users = Arc::new(UserStore::new(config.security.users.clone()));
    let securities = build_securities(&config.security, &users)?;
    let registry = Arc::new(SecurityRegistry::with_accept_negotiation(securities)?);

    tracing::info!(schemes = ?registry.names(), "Authentication schemes ready");

    let state = AppState {
        registry,
        sessions,
        users,
        jwt: config.security.jwt.as_ref().map(JwtManager::from_config),
        cookie_name: config.session.cookie_name.clone(),
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "Server listening");
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
