//! HTTP Basic authentication against the configured users.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Escalation;
use crate::exchange::Exchange;
use crate::schemes::UserStore;
use crate::security::{
    AccessControl, ChallengeContext, ChallengeFragment, CredentialKind, Credentials, HttpSecurity,
    Ratification,
};

pub struct BasicSecurity {
    name: String,
    realm: String,
    content_types: Vec<String>,
    users: Arc<UserStore>,
}

impl BasicSecurity {
    pub fn new(
        name: impl Into<String>,
        realm: impl Into<String>,
        content_types: Vec<String>,
        users: Arc<UserStore>,
    ) -> Self {
        Self {
            name: name.into(),
            realm: realm.into(),
            content_types,
            users,
        }
    }

    /// Supplied credentials, else those of the `Authorization` header.
    fn credentials(&self, supplied: Option<Credentials>, exchange: &Exchange) -> Option<Credentials> {
        supplied
            .or_else(|| Credentials::from_request(&exchange.request()))
            .filter(|c| c.kind() == CredentialKind::Basic)
    }
}

#[async_trait]
impl HttpSecurity for BasicSecurity {
    fn name(&self) -> &str {
        &self.name
    }

    fn credential_kind(&self) -> Option<CredentialKind> {
        Some(CredentialKind::Basic)
    }

    fn content_types(&self) -> &[String] {
        &self.content_types
    }

    fn ratify(&self, credentials: Option<&Credentials>, exchange: &Exchange) -> Ratification {
        match self.credentials(credentials.cloned(), exchange) {
            Some(_) => Ratification::Possible,
            None => Ratification::NotPossible,
        }
    }

    async fn authenticate(
        &self,
        credentials: Option<Credentials>,
        exchange: Arc<Exchange>,
    ) -> Result<Option<AccessControl>, Escalation> {
        let Some(Credentials::Basic { username, password }) =
            self.credentials(credentials, &exchange)
        else {
            return Ok(None);
        };

        match self.users.authenticate(&username, &password) {
            Some(user) => Ok(Some(user.access_control(&self.name))),
            None => {
                tracing::warn!(scheme = %self.name, username = %username, "Failed login attempt");
                Ok(None)
            }
        }
    }

    async fn challenge(&self, context: ChallengeContext<'_>) -> Result<(), Escalation> {
        context.accumulator.add(
            ChallengeFragment::new("Basic", &self.realm).with_param("charset", "UTF-8"),
        );
        Ok(())
    }

    async fn logout(&self, _exchange: Arc<Exchange>) -> Result<(), Escalation> {
        // Browsers keep sending Basic credentials; nothing is held server side
        Ok(())
    }
}
