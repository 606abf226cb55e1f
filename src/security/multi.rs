//! Several scheme contexts presented as one authentication surface.

use futures::future::join_all;

use crate::error::{AuthnError, AuthnResult};
use crate::security::{
    AuthenticationContext, AuthenticationOutcome, CompositeAccessControl, Completion, Credentials,
};

/// Authentication across every configured scheme when no single scheme is
/// forced.
///
/// `selected` holds the scheme indices negotiated for this request. Reads and
/// anonymous authentication only consider those; logout always reaches every
/// scheme the user may have authenticated with.
#[derive(Clone)]
pub struct MultiSchemeAuthentication {
    contexts: Vec<AuthenticationContext>,
    selected: Vec<usize>,
}

impl MultiSchemeAuthentication {
    /// An empty `selected` set falls back to every scheme. Failing to
    /// negotiate only matters once a challenge has to be sent.
    pub fn new(contexts: Vec<AuthenticationContext>, selected: Vec<usize>) -> Self {
        let mut selected: Vec<usize> = selected
            .into_iter()
            .filter(|&index| index < contexts.len())
            .collect();
        if selected.is_empty() {
            selected = (0..contexts.len()).collect();
        }
        Self { contexts, selected }
    }

    pub fn contexts(&self) -> &[AuthenticationContext] {
        &self.contexts
    }

    fn selected(&self) -> impl Iterator<Item = &AuthenticationContext> {
        self.selected.iter().map(|&index| &self.contexts[index])
    }

    pub async fn is_authenticated(&self) -> bool {
        for context in self.selected() {
            if context.is_authenticated().await {
                return true;
            }
        }
        false
    }

    /// Without credentials every selected scheme tries on its own, in
    /// parallel. With credentials, only schemes accepting their kind try.
    ///
    /// Fails with [`AuthnError::NoSchemeAcceptedCredentials`] when no
    /// configured scheme accepts the credentials.
    pub async fn authenticate(
        &self,
        credentials: Option<Credentials>,
        on_complete: Option<Completion>,
    ) -> AuthnResult<AuthenticationOutcome> {
        let attempts: Vec<_> = match &credentials {
            None => self
                .selected()
                .map(|context| context.authenticate(None, None))
                .collect(),
            Some(credentials) => {
                let kind = credentials.kind();
                let accepting: Vec<&AuthenticationContext> = self
                    .contexts
                    .iter()
                    .filter(|context| {
                        context
                            .security()
                            .credential_kind()
                            .map_or(true, |accepted| accepted == kind)
                    })
                    .collect();
                if accepting.is_empty() {
                    tracing::warn!(kind = ?kind, "No configured scheme accepts the credentials");
                    return Err(AuthnError::NoSchemeAcceptedCredentials);
                }
                accepting
                    .into_iter()
                    .map(|context| context.authenticate(Some(credentials.clone()), None))
                    .collect()
            }
        };

        let outcome = combine(join_all(attempts).await);
        if let Some(on_complete) = on_complete {
            on_complete(&outcome);
        }
        Ok(outcome)
    }

    /// Access control merged across the authenticated selected schemes.
    ///
    /// A scheme fault is rethrown only when no scheme authenticated.
    pub async fn access_control(&self) -> AuthnResult<CompositeAccessControl> {
        let mut controls = Vec::new();
        let mut escalation = None;
        for context in self.selected() {
            let outcome = context.outcome().await;
            match outcome.access_control {
                Some(control) => controls.push(control),
                None => {
                    if escalation.is_none() {
                        escalation = outcome.escalation;
                    }
                }
            }
        }

        match CompositeAccessControl::new(controls) {
            Some(composite) => Ok(composite),
            None => match escalation {
                Some(escalation) => Err(escalation.into()),
                None => Err(AuthnError::authentication_required()),
            },
        }
    }

    pub async fn has_role(&self, role: &str) -> bool {
        self.access_control()
            .await
            .map(|composite| composite.has_role(role))
            .unwrap_or(false)
    }

    /// Log out of every configured scheme, negotiated or not.
    pub async fn logout(&self, on_complete: Option<Completion>) -> AuthenticationOutcome {
        let outcomes = join_all(self.contexts.iter().map(|context| context.logout(None))).await;
        let outcome = AuthenticationOutcome {
            access_control: None,
            escalation: outcomes.into_iter().find_map(|outcome| outcome.escalation),
        };
        if let Some(on_complete) = on_complete {
            on_complete(&outcome);
        }
        outcome
    }
}

/// The first authenticated outcome wins, then the first fault.
fn combine(outcomes: Vec<AuthenticationOutcome>) -> AuthenticationOutcome {
    let mut escalation = None;
    for outcome in outcomes {
        if outcome.access_control.is_some() {
            return AuthenticationOutcome {
                access_control: outcome.access_control,
                escalation: None,
            };
        }
        if escalation.is_none() {
            escalation = outcome.escalation;
        }
    }
    AuthenticationOutcome {
        access_control: None,
        escalation,
    }
}
