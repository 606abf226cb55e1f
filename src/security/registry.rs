//! Configured schemes, and the security surface of each request built from them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AuthnError, AuthnResult};
use crate::exchange::Exchange;
use crate::security::{
    AcceptNegotiator, AuthenticationContext, ChallengeOrchestrator, HttpSecurity,
    LoginContinuation, MultiSchemeAuthentication, SchemeNegotiator,
};

/// The configured schemes, in configuration order, and their negotiator.
pub struct SecurityRegistry {
    securities: Vec<Arc<dyn HttpSecurity>>,
    negotiator: Arc<dyn SchemeNegotiator>,
}

impl SecurityRegistry {
    /// Fails when no scheme is configured or two share a name.
    pub fn new(
        securities: Vec<Arc<dyn HttpSecurity>>,
        negotiator: Arc<dyn SchemeNegotiator>,
    ) -> AuthnResult<Self> {
        if securities.is_empty() {
            return Err(AuthnError::Config(
                "at least one authentication scheme must be configured".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for security in &securities {
            if !names.insert(security.name()) {
                return Err(AuthnError::Config(format!(
                    "duplicate authentication scheme '{}'",
                    security.name()
                )));
            }
        }

        Ok(Self {
            securities,
            negotiator,
        })
    }

    /// Negotiate on the content types each scheme declares.
    pub fn with_accept_negotiation(securities: Vec<Arc<dyn HttpSecurity>>) -> AuthnResult<Self> {
        let negotiator = AcceptNegotiator::for_securities(&securities)?;
        Self::new(securities, Arc::new(negotiator))
    }

    pub fn names(&self) -> Vec<String> {
        self.securities.iter().map(|s| s.name().to_string()).collect()
    }

    /// One authentication context per scheme for `exchange`.
    pub fn for_exchange(&self, exchange: Arc<Exchange>) -> RequestSecurity {
        let contexts = self
            .securities
            .iter()
            .map(|security| AuthenticationContext::new(Arc::clone(security), Arc::clone(&exchange)))
            .collect();

        RequestSecurity {
            negotiator: Arc::clone(&self.negotiator),
            exchange,
            contexts,
        }
    }
}

/// Security surface of one request.
///
/// Every consumer within the request shares the same contexts, so a result
/// resolved once is seen by all of them.
#[derive(Clone)]
pub struct RequestSecurity {
    negotiator: Arc<dyn SchemeNegotiator>,
    exchange: Arc<Exchange>,
    contexts: Vec<AuthenticationContext>,
}

impl RequestSecurity {
    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }

    pub fn contexts(&self) -> &[AuthenticationContext] {
        &self.contexts
    }

    /// The context of the named scheme.
    pub fn context(&self, name: &str) -> AuthnResult<&AuthenticationContext> {
        self.contexts
            .iter()
            .find(|context| context.name() == name)
            .ok_or_else(|| AuthnError::UnknownScheme(name.to_string()))
    }

    /// All schemes as one, restricted to those negotiated for this request.
    pub fn multi(&self) -> MultiSchemeAuthentication {
        let selected = if self.contexts.len() == 1 {
            vec![0]
        } else {
            let accept = self.exchange.accept();
            self.negotiator.select_handlers(accept.as_deref())
        };
        MultiSchemeAuthentication::new(self.contexts.clone(), selected)
    }

    pub fn orchestrator(&self) -> ChallengeOrchestrator {
        ChallengeOrchestrator::new(
            self.contexts
                .iter()
                .map(|context| Arc::clone(context.security()))
                .collect(),
            Arc::clone(&self.negotiator),
            Arc::clone(&self.exchange),
        )
    }

    pub fn continuation(&self, name: &str) -> AuthnResult<LoginContinuation> {
        Ok(LoginContinuation::new(self.context(name)?.clone()))
    }
}
