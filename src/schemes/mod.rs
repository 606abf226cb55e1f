//! Concrete authentication schemes built from configuration.

mod basic;
mod bearer;
mod form;
mod users;

pub use basic::*;
pub use bearer::*;
pub use form::*;
pub use users::*;

use std::sync::Arc;

use crate::config::{SchemeConfig, SchemeKind, SecurityConfig};
use crate::error::{AuthnError, AuthnResult};
use crate::security::HttpSecurity;

const DEFAULT_LOGIN_PATH: &str = "/login";

/// Build every configured scheme, in configuration order.
pub fn build_securities(
    config: &SecurityConfig,
    users: &Arc<UserStore>,
) -> AuthnResult<Vec<Arc<dyn HttpSecurity>>> {
    config
        .schemes
        .iter()
        .map(|scheme| build_security(scheme, config, users))
        .collect()
}

fn build_security(
    scheme: &SchemeConfig,
    config: &SecurityConfig,
    users: &Arc<UserStore>,
) -> AuthnResult<Arc<dyn HttpSecurity>> {
    let security: Arc<dyn HttpSecurity> = match scheme.kind {
        SchemeKind::Basic => Arc::new(BasicSecurity::new(
            &scheme.name,
            &scheme.realm,
            scheme.content_types.clone(),
            Arc::clone(users),
        )),
        SchemeKind::Bearer => {
            let jwt = config.jwt.as_ref().ok_or_else(|| {
                AuthnError::Config(format!(
                    "bearer scheme '{}' requires the jwt section",
                    scheme.name
                ))
            })?;
            Arc::new(BearerSecurity::new(
                &scheme.name,
                &scheme.realm,
                scheme.content_types.clone(),
                JwtManager::from_config(jwt),
            ))
        }
        SchemeKind::Form => Arc::new(FormSecurity::new(
            &scheme.name,
            scheme
                .login_path
                .clone()
                .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string()),
            scheme.content_types.clone(),
            Arc::clone(users),
        )),
    };

    tracing::debug!(scheme = %scheme.name, kind = ?scheme.kind, "Configured scheme");
    Ok(security)
}
