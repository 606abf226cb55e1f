//! Login submitted by the application, followed by replay of the request
//! that was challenged.

use crate::error::{AuthnError, AuthnResult, Escalation};
use crate::security::{
    AccessControl, AuthenticationContext, AuthenticationOutcome, Credentials, RequestMomento,
};

pub struct LoginContinuation {
    context: AuthenticationContext,
}

impl LoginContinuation {
    pub fn new(context: AuthenticationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AuthenticationContext {
        &self.context
    }

    /// Authenticate with the submitted credentials. `on_failure` runs when
    /// the scheme escalates.
    pub async fn start<F>(&self, credentials: Credentials, on_failure: F) -> AuthenticationOutcome
    where
        F: FnOnce(&Escalation) + Send,
    {
        self.context.exchange().mark_login_submission();
        let outcome = self.context.authenticate(Some(credentials), None).await;
        if let Some(escalation) = &outcome.escalation {
            on_failure(escalation);
        }
        outcome
    }

    /// Replay the captured request into the live exchange and consume it.
    ///
    /// Fails with "authentication required" if the login did not produce
    /// access control, and with [`AuthnError::ContinuationWithoutRequest`]
    /// when no request was captured. Neither failure touches the session.
    pub async fn complete(&self) -> AuthnResult<AccessControl> {
        let access_control = self.context.access_control().await?;

        let exchange = self.context.exchange();
        let session = exchange.session();
        let Some(momento) = RequestMomento::take(session).await? else {
            tracing::warn!(
                scheme = %self.context.name(),
                "Login completed without a captured request"
            );
            return Err(AuthnError::ContinuationWithoutRequest);
        };

        momento.restore(exchange)?;

        let request = exchange.request();
        tracing::info!(
            scheme = %self.context.name(),
            principal = %access_control.principal(),
            method = %request.method,
            path = %request.path,
            "Restored request after login"
        );
        Ok(access_control)
    }

    /// `start` then `complete`, with an escalation surfaced as an error.
    pub async fn login(&self, credentials: Credentials) -> AuthnResult<AccessControl> {
        let mut failure = None;
        self.start(credentials, |escalation| failure = Some(escalation.clone()))
            .await;
        if let Some(escalation) = failure {
            return Err(escalation.into());
        }
        self.complete().await
    }
}
