//! Per-scheme, per-request cache of the authentication result.
//!
//! Every read and write of the cached result goes through [`AuthenticationContext::run`],
//! so no reader ever observes a half-updated pair and completions arriving on
//! other tasks re-enter through the same lock before touching state.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{watch, Mutex};

use crate::error::{AuthnError, AuthnResult, Escalation};
use crate::exchange::Exchange;
use crate::security::{AccessControl, Credentials, HttpSecurity, Ratification};

/// Result of an authenticate or logout operation.
///
/// At most one of the two fields is set. Neither set means the request is
/// unauthenticated.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationOutcome {
    pub access_control: Option<AccessControl>,
    pub escalation: Option<Escalation>,
}

impl AuthenticationOutcome {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn escalated(escalation: Escalation) -> Self {
        Self {
            access_control: None,
            escalation: Some(escalation),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_control.is_some()
    }
}

/// Notified with every outcome, in registration order.
pub type Listener = Arc<dyn Fn(&AuthenticationOutcome) + Send + Sync>;

/// Invoked once with the outcome of a single operation.
pub type Completion = Box<dyn FnOnce(&AuthenticationOutcome) + Send>;

type Published = watch::Receiver<Option<AuthenticationOutcome>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Authenticate,
    Logout,
}

/// The one scheme operation running for a context.
struct InFlight {
    operation: Operation,
    receiver: Published,
}

impl InFlight {
    fn start(
        operation: Operation,
    ) -> (Self, watch::Sender<Option<AuthenticationOutcome>>) {
        let (sender, receiver) = watch::channel(None);
        (
            Self {
                operation,
                receiver,
            },
            sender,
        )
    }
}

/// State guarded by the context's lock.
#[derive(Default)]
pub struct CachedState {
    access_control: Option<AccessControl>,
    escalation: Option<Escalation>,
    listeners: Vec<Listener>,
    in_flight: Option<InFlight>,
    /// Bumped by logout so an authentication started before it is discarded.
    epoch: u64,
}

impl CachedState {
    pub fn access_control(&self) -> Option<&AccessControl> {
        self.access_control.as_ref()
    }

    pub fn escalation(&self) -> Option<&Escalation> {
        self.escalation.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_control.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn outcome(&self) -> AuthenticationOutcome {
        AuthenticationOutcome {
            access_control: self.access_control.clone(),
            escalation: self.escalation.clone(),
        }
    }

    /// The cached outcome, if authentication has been resolved.
    fn resolved(&self) -> Option<AuthenticationOutcome> {
        if self.access_control.is_some() || self.escalation.is_some() {
            Some(self.outcome())
        } else {
            None
        }
    }

    fn set_result(&mut self, result: Result<Option<AccessControl>, Escalation>) {
        match result {
            Ok(control) => {
                self.access_control = control;
                self.escalation = None;
            }
            Err(escalation) => {
                self.access_control = None;
                self.escalation = Some(escalation);
            }
        }
    }

    /// The access control, rethrowing a cached escalation.
    pub fn require_access_control(&self, scheme: &str) -> AuthnResult<AccessControl> {
        if let Some(escalation) = &self.escalation {
            return Err(AuthnError::from(escalation.clone()));
        }
        self.access_control
            .clone()
            .ok_or_else(|| AuthnError::authentication_required_for(scheme))
    }
}

/// Authentication result of one scheme within one request.
#[derive(Clone)]
pub struct AuthenticationContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    security: Arc<dyn HttpSecurity>,
    exchange: Arc<Exchange>,
    state: Mutex<CachedState>,
}

enum AuthenticateStep {
    Resolved(AuthenticationOutcome, Vec<Listener>),
    Join(Published),
    AwaitLogout(Published),
    Start {
        epoch: u64,
        sender: watch::Sender<Option<AuthenticationOutcome>>,
    },
    Anonymous,
}

enum LogoutStep {
    AlreadyClear(Vec<Listener>),
    Join(Published),
    Start(watch::Sender<Option<AuthenticationOutcome>>),
}

impl AuthenticationContext {
    pub fn new(security: Arc<dyn HttpSecurity>, exchange: Arc<Exchange>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                security,
                exchange,
                state: Mutex::new(CachedState::default()),
            }),
        }
    }

    /// The scheme qualifier this context belongs to.
    pub fn name(&self) -> &str {
        self.inner.security.name()
    }

    pub fn security(&self) -> &Arc<dyn HttpSecurity> {
        &self.inner.security
    }

    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.inner.exchange
    }

    /// Run `operation` with exclusive access to the cached state.
    pub async fn run<R>(&self, operation: impl FnOnce(&mut CachedState) -> R) -> R {
        let mut state = self.inner.state.lock().await;
        operation(&mut state)
    }

    /// Add a listener. It is not notified of the current state.
    pub async fn register<F>(&self, listener: F)
    where
        F: Fn(&AuthenticationOutcome) + Send + Sync + 'static,
    {
        self.run(|state| state.listeners.push(Arc::new(listener)))
            .await;
    }

    /// Authenticate with the scheme, serving a cached result when there is one.
    ///
    /// Only one scheme operation runs at a time. Callers arriving while an
    /// authentication is in flight receive its outcome; callers arriving
    /// during a logout wait for it and then authenticate afresh.
    pub async fn authenticate(
        &self,
        credentials: Option<Credentials>,
        on_complete: Option<Completion>,
    ) -> AuthenticationOutcome {
        let outcome = loop {
            let step = self
                .run(|state| {
                    if let Some(in_flight) = &state.in_flight {
                        let receiver = in_flight.receiver.clone();
                        return match in_flight.operation {
                            Operation::Authenticate => AuthenticateStep::Join(receiver),
                            Operation::Logout => AuthenticateStep::AwaitLogout(receiver),
                        };
                    }
                    if let Some(outcome) = state.resolved() {
                        return AuthenticateStep::Resolved(outcome, state.listeners.clone());
                    }
                    match self
                        .inner
                        .security
                        .ratify(credentials.as_ref(), &self.inner.exchange)
                    {
                        Ratification::Resolved(control) => {
                            state.access_control = Some(control);
                            AuthenticateStep::Resolved(state.outcome(), state.listeners.clone())
                        }
                        Ratification::Possible => {
                            let (in_flight, sender) = InFlight::start(Operation::Authenticate);
                            state.in_flight = Some(in_flight);
                            AuthenticateStep::Start {
                                epoch: state.epoch,
                                sender,
                            }
                        }
                        Ratification::NotPossible => AuthenticateStep::Anonymous,
                    }
                })
                .await;

            match step {
                AuthenticateStep::Resolved(outcome, listeners) => {
                    tracing::debug!(scheme = %self.name(), "Serving resolved authentication");
                    notify(&listeners, &outcome);
                    break outcome;
                }
                AuthenticateStep::Anonymous => {
                    tracing::debug!(scheme = %self.name(), "Nothing to authenticate with");
                    break AuthenticationOutcome::anonymous();
                }
                AuthenticateStep::Join(receiver) => {
                    tracing::debug!(scheme = %self.name(), "Joining in-flight authentication");
                    break wait_for(receiver).await;
                }
                AuthenticateStep::AwaitLogout(receiver) => {
                    tracing::debug!(scheme = %self.name(), "Waiting for in-flight logout");
                    if published(receiver).await.is_none() {
                        break lost();
                    }
                }
                AuthenticateStep::Start { epoch, sender } => {
                    let receiver = sender.subscribe();
                    self.spawn_authentication(credentials, epoch, sender);
                    break wait_for(receiver).await;
                }
            }
        };

        if let Some(on_complete) = on_complete {
            on_complete(&outcome);
        }
        outcome
    }

    fn spawn_authentication(
        &self,
        credentials: Option<Credentials>,
        epoch: u64,
        sender: watch::Sender<Option<AuthenticationOutcome>>,
    ) {
        let context = self.clone();
        let flight = self.inner.exchange.flights().start();

        tokio::spawn(async move {
            let _flight = flight;
            let security = Arc::clone(&context.inner.security);
            let exchange = Arc::clone(&context.inner.exchange);
            let result = guarded(
                security.name(),
                security.authenticate(credentials, exchange),
            )
            .await;
            context.complete_authentication(epoch, result, sender).await;
        });
    }

    async fn complete_authentication(
        &self,
        epoch: u64,
        result: Result<Option<AccessControl>, Escalation>,
        sender: watch::Sender<Option<AuthenticationOutcome>>,
    ) {
        let (outcome, listeners) = self
            .run(|state| {
                if state.epoch != epoch {
                    return (state.outcome(), None);
                }
                state.in_flight = None;
                state.set_result(result);
                (state.outcome(), Some(state.listeners.clone()))
            })
            .await;

        match listeners {
            Some(listeners) => {
                tracing::info!(
                    scheme = %self.name(),
                    authenticated = outcome.is_authenticated(),
                    escalated = outcome.escalation.is_some(),
                    "Authentication complete"
                );
                notify(&listeners, &outcome);
            }
            None => {
                tracing::warn!(
                    scheme = %self.name(),
                    "Discarding authentication that completed after logout"
                );
            }
        }

        sender.send_replace(Some(outcome));
    }

    /// Log out of the scheme and clear the cached result.
    ///
    /// The cache is cleared as soon as the logout starts. Concurrent logouts
    /// join the one in flight, and an authentication still in flight is
    /// discarded when it completes.
    pub async fn logout(&self, on_complete: Option<Completion>) -> AuthenticationOutcome {
        let step = self
            .run(|state| {
                if let Some(in_flight) = &state.in_flight {
                    if in_flight.operation == Operation::Logout {
                        return LogoutStep::Join(in_flight.receiver.clone());
                    }
                }
                state.epoch += 1;
                state.in_flight = None;
                if state.resolved().is_none() {
                    return LogoutStep::AlreadyClear(state.listeners.clone());
                }
                state.access_control = None;
                state.escalation = None;
                let (in_flight, sender) = InFlight::start(Operation::Logout);
                state.in_flight = Some(in_flight);
                LogoutStep::Start(sender)
            })
            .await;

        let outcome = match step {
            LogoutStep::AlreadyClear(listeners) => {
                tracing::debug!(scheme = %self.name(), "Already logged out");
                let outcome = AuthenticationOutcome::anonymous();
                notify(&listeners, &outcome);
                outcome
            }
            LogoutStep::Join(receiver) => {
                tracing::debug!(scheme = %self.name(), "Joining in-flight logout");
                wait_for(receiver).await
            }
            LogoutStep::Start(sender) => {
                let receiver = sender.subscribe();
                let context = self.clone();
                let flight = self.inner.exchange.flights().start();
                tokio::spawn(async move {
                    let _flight = flight;
                    let security = Arc::clone(&context.inner.security);
                    let exchange = Arc::clone(&context.inner.exchange);
                    let result = guarded(security.name(), security.logout(exchange)).await;
                    context.complete_logout(result, sender).await;
                });
                wait_for(receiver).await
            }
        };

        if let Some(on_complete) = on_complete {
            on_complete(&outcome);
        }
        outcome
    }

    async fn complete_logout(
        &self,
        result: Result<(), Escalation>,
        sender: watch::Sender<Option<AuthenticationOutcome>>,
    ) {
        let (outcome, listeners) = self
            .run(|state| {
                state.in_flight = None;
                state.set_result(result.map(|()| None));
                (state.outcome(), state.listeners.clone())
            })
            .await;

        tracing::info!(
            scheme = %self.name(),
            escalated = outcome.escalation.is_some(),
            "Logout complete"
        );
        notify(&listeners, &outcome);
        sender.send_replace(Some(outcome));
    }

    /// The cached access control.
    ///
    /// Fails with the cached escalation, or with "authentication required"
    /// naming this scheme when there is no access control.
    pub async fn access_control(&self) -> AuthnResult<AccessControl> {
        let scheme = self.name();
        self.run(|state| state.require_access_control(scheme))
            .await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.run(|state| state.is_authenticated()).await
    }

    /// Snapshot of the cached result.
    pub async fn outcome(&self) -> AuthenticationOutcome {
        self.run(|state| state.outcome()).await
    }
}

fn notify(listeners: &[Listener], outcome: &AuthenticationOutcome) {
    for listener in listeners {
        listener(outcome);
    }
}

/// The outcome published by an in-flight operation, or `None` if its
/// completion was dropped.
async fn published(mut receiver: Published) -> Option<AuthenticationOutcome> {
    receiver
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|value| value.clone())
}

/// Wait for the in-flight operation to publish its outcome.
async fn wait_for(receiver: Published) -> AuthenticationOutcome {
    published(receiver).await.unwrap_or_else(lost)
}

fn lost() -> AuthenticationOutcome {
    AuthenticationOutcome::escalated(Escalation::Fatal(
        "completion of the in-flight operation was lost".to_string(),
    ))
}

/// Run a scheme operation, turning a panic into a fatal escalation.
async fn guarded<T>(
    scheme: &str,
    operation: impl Future<Output = Result<T, Escalation>>,
) -> Result<T, Escalation> {
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(scheme = %scheme, "Scheme operation panicked");
            Err(Escalation::Fatal(format!("scheme '{scheme}' panicked")))
        }
    }
}
