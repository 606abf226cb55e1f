//! Turns "authentication required" into a challenge response.
//!
//! One round walks `Idle → MomentoCaptured → Negotiated → Challenging → Flushed`:
//! the triggering request is saved (unless an earlier round already saved
//! one), the schemes to challenge are chosen, each challenges into a shared
//! accumulator, and the accumulator is written to the response.

use std::sync::Arc;

use crate::error::{AuthnError, AuthnResult};
use crate::exchange::Exchange;
use crate::security::{
    ChallengeAccumulator, ChallengeContext, HttpSecurity, RequestMomento, SchemeNegotiator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Idle,
    MomentoCaptured,
    Negotiated,
    Challenging,
    Flushed,
}

/// What a finished challenge round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRound {
    pub state: ChallengeState,
    /// Schemes that challenged, in order.
    pub schemes: Vec<String>,
    /// The momento was stored by this round.
    pub momento_stored: bool,
    /// A `401` with the combined challenge header was written.
    pub header_written: bool,
}

pub struct ChallengeOrchestrator {
    securities: Vec<Arc<dyn HttpSecurity>>,
    negotiator: Arc<dyn SchemeNegotiator>,
    exchange: Arc<Exchange>,
}

impl ChallengeOrchestrator {
    pub fn new(
        securities: Vec<Arc<dyn HttpSecurity>>,
        negotiator: Arc<dyn SchemeNegotiator>,
        exchange: Arc<Exchange>,
    ) -> Self {
        Self {
            securities,
            negotiator,
            exchange,
        }
    }

    /// Challenge for `error`, which must be [`AuthnError::AuthenticationRequired`].
    /// Any other error is handed back untouched.
    pub async fn handle(&self, error: AuthnError) -> AuthnResult<ChallengeRound> {
        match error {
            AuthnError::AuthenticationRequired { scheme } => self.challenge(scheme.as_deref()).await,
            other => Err(other),
        }
    }

    /// Run one challenge round, targeting `scheme` when named.
    pub async fn challenge(&self, scheme: Option<&str>) -> AuthnResult<ChallengeRound> {
        let mut state = ChallengeState::Idle;

        let momento_stored = self.capture_momento().await?;
        self.advance(&mut state, ChallengeState::MomentoCaptured);

        let targets = self.negotiate(scheme)?;
        self.advance(&mut state, ChallengeState::Negotiated);

        let accumulator = ChallengeAccumulator::new();
        self.advance(&mut state, ChallengeState::Challenging);
        let mut schemes = Vec::with_capacity(targets.len());
        for index in targets {
            let security = &self.securities[index];
            security
                .challenge(ChallengeContext {
                    exchange: &self.exchange,
                    accumulator: &accumulator,
                })
                .await
                .map_err(|escalation| {
                    tracing::error!(scheme = %security.name(), error = %escalation, "Challenge failed");
                    AuthnError::from(escalation)
                })?;
            schemes.push(security.name().to_string());
        }

        let header_written = accumulator.flush(&mut self.exchange.response());
        self.advance(&mut state, ChallengeState::Flushed);

        tracing::info!(
            schemes = ?schemes,
            momento_stored,
            header_written,
            "Challenge sent"
        );

        Ok(ChallengeRound {
            state,
            schemes,
            momento_stored,
            header_written,
        })
    }

    fn advance(&self, state: &mut ChallengeState, next: ChallengeState) {
        tracing::debug!(from = ?state, to = ?next, "Challenge state");
        *state = next;
    }

    /// Save the triggering request unless a round before this one did.
    async fn capture_momento(&self) -> AuthnResult<bool> {
        if self.exchange.is_login_submission() {
            tracing::debug!("Not capturing a login submission");
            return Ok(false);
        }
        let session = self.exchange.session();
        if RequestMomento::is_stored(session) {
            tracing::debug!("Keeping request captured by an earlier challenge");
            return Ok(false);
        }
        let momento = RequestMomento::capture(&self.exchange)?;
        let stored = momento.store_if_absent(session).await?;
        if !stored {
            tracing::debug!("Another request captured the momento first");
        }
        Ok(stored)
    }

    /// Indices of the schemes to challenge.
    fn negotiate(&self, scheme: Option<&str>) -> AuthnResult<Vec<usize>> {
        if let Some(name) = scheme {
            return match self.securities.iter().position(|s| s.name() == name) {
                Some(index) => Ok(vec![index]),
                None => {
                    tracing::warn!(scheme = %name, "Challenge requested for unconfigured scheme");
                    Err(AuthnError::UnknownScheme(name.to_string()))
                }
            };
        }

        if self.securities.len() == 1 {
            return Ok(vec![0]);
        }

        let accept = self.exchange.accept();
        let selected: Vec<usize> = self
            .negotiator
            .select_handlers(accept.as_deref())
            .into_iter()
            .filter(|&index| index < self.securities.len())
            .collect();
        if selected.is_empty() {
            let accept = accept.unwrap_or_else(|| "*/*".to_string());
            tracing::warn!(accept = %accept, "No configured scheme can challenge the client");
            return Err(AuthnError::NoNegotiatedScheme { accept });
        }
        Ok(selected)
    }
}
