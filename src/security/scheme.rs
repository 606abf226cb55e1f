//! Contract implemented by each pluggable authentication scheme.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Escalation;
use crate::exchange::Exchange;
use crate::security::{AccessControl, ChallengeAccumulator, CredentialKind, Credentials};
use crate::session::Session;

/// Outcome of a scheme's synchronous pre-check.
#[derive(Debug, Clone, PartialEq)]
pub enum Ratification {
    /// The scheme resolved access control without a round trip, typically
    /// from a login remembered in the session.
    Resolved(AccessControl),
    /// Authentication can be attempted with the given credentials.
    Possible,
    /// Nothing to authenticate with. The request stays anonymous.
    NotPossible,
}

/// What a scheme may touch while challenging the client.
pub struct ChallengeContext<'a> {
    pub exchange: &'a Exchange,
    /// Shared by every scheme challenging in this round.
    pub accumulator: &'a ChallengeAccumulator,
}

/// A pluggable authentication mechanism (Basic, Bearer, form login, ...).
///
/// Asynchronous operations report their result through the returned value;
/// the authentication context caches it.
#[async_trait]
pub trait HttpSecurity: Send + Sync {
    /// Scheme qualifier, unique within the configuration.
    fn name(&self) -> &str;

    /// Credential kind accepted by `authenticate`. `None` accepts any.
    fn credential_kind(&self) -> Option<CredentialKind> {
        None
    }

    /// Content types the challenge produces. Empty means any.
    fn content_types(&self) -> &[String] {
        &[]
    }

    fn ratify(&self, credentials: Option<&Credentials>, exchange: &Exchange) -> Ratification;

    /// Authenticate; `Ok(None)` leaves the request unauthenticated.
    async fn authenticate(
        &self,
        credentials: Option<Credentials>,
        exchange: Arc<Exchange>,
    ) -> Result<Option<AccessControl>, Escalation>;

    /// Ask the client to authenticate, by adding a challenge fragment or
    /// by writing the response directly (for instance a redirect).
    async fn challenge(&self, context: ChallengeContext<'_>) -> Result<(), Escalation>;

    async fn logout(&self, exchange: Arc<Exchange>) -> Result<(), Escalation>;
}

fn remembered_key(scheme: &str) -> String {
    format!("security.{scheme}.access_control")
}

/// Access control a scheme stored in the session on an earlier request.
pub fn remembered_access_control(session: &Session, scheme: &str) -> Option<AccessControl> {
    let blob = session.get_attribute(&remembered_key(scheme))?;
    match serde_json::from_slice(&blob) {
        Ok(control) => Some(control),
        Err(e) => {
            tracing::warn!(scheme = %scheme, error = %e, "Discarding unreadable remembered login");
            None
        }
    }
}

pub fn remember_access_control(
    session: &Session,
    control: &AccessControl,
) -> Result<(), Escalation> {
    let blob = serde_json::to_vec(control).map_err(Escalation::other)?;
    session.set_attribute(remembered_key(control.scheme()), blob);
    Ok(())
}

pub fn forget_access_control(session: &Session, scheme: &str) {
    session.remove_attribute(&remembered_key(scheme));
}
