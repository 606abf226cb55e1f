//! Application form login, remembered in the session.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Escalation;
use crate::exchange::Exchange;
use crate::schemes::UserStore;
use crate::security::{
    forget_access_control, remember_access_control, remembered_access_control, AccessControl,
    ChallengeContext, CredentialKind, Credentials, HttpSecurity, Ratification,
};

/// Challenges by redirecting to a login page. A successful login is kept in
/// the session and resolved by `ratify` on later requests.
pub struct FormSecurity {
    name: String,
    login_path: String,
    content_types: Vec<String>,
    users: Arc<UserStore>,
}

impl FormSecurity {
    pub fn new(
        name: impl Into<String>,
        login_path: impl Into<String>,
        content_types: Vec<String>,
        users: Arc<UserStore>,
    ) -> Self {
        Self {
            name: name.into(),
            login_path: login_path.into(),
            content_types,
            users,
        }
    }
}

#[async_trait]
impl HttpSecurity for FormSecurity {
    fn name(&self) -> &str {
        &self.name
    }

    fn credential_kind(&self) -> Option<CredentialKind> {
        Some(CredentialKind::Form)
    }

    fn content_types(&self) -> &[String] {
        &self.content_types
    }

    fn ratify(&self, credentials: Option<&Credentials>, exchange: &Exchange) -> Ratification {
        if let Some(control) = remembered_access_control(exchange.session(), &self.name) {
            return Ratification::Resolved(control);
        }
        match credentials {
            Some(Credentials::Form { .. }) => Ratification::Possible,
            _ => Ratification::NotPossible,
        }
    }

    async fn authenticate(
        &self,
        credentials: Option<Credentials>,
        exchange: Arc<Exchange>,
    ) -> Result<Option<AccessControl>, Escalation> {
        let Some(Credentials::Form { username, password }) = credentials else {
            return Ok(None);
        };

        let Some(user) = self.users.authenticate(&username, &password) else {
            tracing::warn!(scheme = %self.name, username = %username, "Failed login attempt");
            return Ok(None);
        };

        let control = user.access_control(&self.name);
        remember_access_control(exchange.session(), &control)?;
        tracing::info!(scheme = %self.name, username = %username, "User logged in");
        Ok(Some(control))
    }

    async fn challenge(&self, context: ChallengeContext<'_>) -> Result<(), Escalation> {
        let mut response = context.exchange.response();
        response.set_status(303);
        response.set_header("location", self.login_path.clone());
        Ok(())
    }

    async fn logout(&self, exchange: Arc<Exchange>) -> Result<(), Escalation> {
        forget_access_control(exchange.session(), &self.name);
        Ok(())
    }
}
