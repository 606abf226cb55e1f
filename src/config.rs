//! Configuration module for authn-gate.
//!
//! Loads configuration from YAML files and environment variables.

use std::collections::HashSet;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::{AuthnError, AuthnResult};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub security: SecurityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which backend keeps session attributes between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    Memory,
    Sqlite,
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub store: SessionBackend,
    /// Only used by the sqlite backend.
    #[serde(default = "default_session_url")]
    pub database_url: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

fn default_session_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_cookie_name() -> String {
    "authn_session".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: SessionBackend::Memory,
            database_url: default_session_url(),
            cookie_name: default_cookie_name(),
        }
    }
}

/// The kinds of scheme that can be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    Basic,
    Bearer,
    Form,
}

/// One configured authentication scheme.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemeConfig {
    /// Qualifier identifying the scheme within the request.
    pub name: String,
    pub kind: SchemeKind,
    pub realm: String,
    /// Content types the scheme's challenge produces. Empty means any.
    #[serde(default)]
    pub content_types: Vec<String>,
    /// Login page for form schemes.
    #[serde(default)]
    pub login_path: Option<String>,
}

/// User known to the password based schemes.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguredUser {
    pub username: String,
    /// Password hash (SHA256 hex).
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// JWT settings for bearer schemes.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    #[serde(default = "default_token_duration_hours")]
    pub token_duration_hours: i64,
}

fn default_token_duration_hours() -> i64 {
    24
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub schemes: Vec<SchemeConfig>,
    #[serde(default)]
    pub users: Vec<ConfiguredUser>,
    pub jwt: Option<JwtConfig>,
}

impl SecurityConfig {
    /// Reject configurations that could never challenge a client.
    pub fn validate(&self) -> AuthnResult<()> {
        if self.schemes.is_empty() {
            return Err(AuthnError::Config(
                "at least one authentication scheme must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for scheme in &self.schemes {
            if !names.insert(scheme.name.as_str()) {
                return Err(AuthnError::Config(format!(
                    "duplicate authentication scheme '{}'",
                    scheme.name
                )));
            }
            if scheme.realm.trim().is_empty() {
                return Err(AuthnError::Config(format!(
                    "scheme '{}' has an empty realm",
                    scheme.name
                )));
            }
            if scheme.kind == SchemeKind::Bearer && self.jwt.is_none() {
                return Err(AuthnError::Config(format!(
                    "bearer scheme '{}' requires the jwt section",
                    scheme.name
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (AUTHN_*)
    /// 2. config/local.yaml (if exists)
    /// 3. config/default.yaml
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("AUTHN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(name: &str, kind: SchemeKind) -> SchemeConfig {
        SchemeConfig {
            name: name.to_string(),
            kind,
            realm: "example".to_string(),
            content_types: vec![],
            login_path: None,
        }
    }

    fn security(schemes: Vec<SchemeConfig>) -> SecurityConfig {
        SecurityConfig {
            schemes,
            users: vec![],
            jwt: None,
        }
    }

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.store, SessionBackend::Memory);
        assert_eq!(config.cookie_name, "authn_session");
    }

    #[test]
    fn test_empty_scheme_set_rejected() {
        let err = security(vec![]).validate().unwrap_err();
        assert!(matches!(err, AuthnError::Config(_)));
    }

    #[test]
    fn test_duplicate_scheme_rejected() {
        let config = security(vec![
            scheme("basic", SchemeKind::Basic),
            scheme("basic", SchemeKind::Form),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bearer_requires_jwt() {
        let config = security(vec![scheme("bearer", SchemeKind::Bearer)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_config() {
        let config = security(vec![
            scheme("basic", SchemeKind::Basic),
            scheme("form", SchemeKind::Form),
        ]);
        assert!(config.validate().is_ok());
    }
}
