//! Scripted scheme used by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Escalation;
use crate::exchange::{ConnectionState, Exchange, RequestState};
use crate::security::{
    AccessControl, ChallengeContext, ChallengeFragment, CredentialKind, Credentials,
    HttpSecurity, Ratification,
};
use crate::session::Session;

#[derive(Debug, Default)]
pub struct Calls {
    pub ratify: AtomicUsize,
    pub authenticate: AtomicUsize,
    pub challenge: AtomicUsize,
    pub logout: AtomicUsize,
}

impl Calls {
    pub fn authenticate(&self) -> usize {
        self.authenticate.load(Ordering::SeqCst)
    }

    pub fn challenge(&self) -> usize {
        self.challenge.load(Ordering::SeqCst)
    }

    pub fn logout(&self) -> usize {
        self.logout.load(Ordering::SeqCst)
    }
}

enum ChallengeStyle {
    Fragment,
    Redirect(String),
}

pub struct ScriptedSecurity {
    name: String,
    kind: Option<CredentialKind>,
    content_types: Vec<String>,
    ratification: Mutex<Ratification>,
    result: Mutex<Result<Option<AccessControl>, Escalation>>,
    logout_result: Mutex<Result<(), Escalation>>,
    delay: Option<Duration>,
    challenge: ChallengeStyle,
    pub calls: Calls,
}

impl ScriptedSecurity {
    /// Authenticates everyone as `user` with role `member`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            content_types: Vec::new(),
            ratification: Mutex::new(Ratification::Possible),
            result: Mutex::new(Ok(Some(
                AccessControl::new(name, "user").with_roles(["member"]),
            ))),
            logout_result: Mutex::new(Ok(())),
            delay: None,
            challenge: ChallengeStyle::Fragment,
            calls: Calls::default(),
        }
    }

    pub fn accepting(mut self, kind: CredentialKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn producing(mut self, content_type: &str) -> Self {
        self.content_types.push(content_type.to_string());
        self
    }

    pub fn ratifying(self, ratification: Ratification) -> Self {
        *self.ratification.lock() = ratification;
        self
    }

    pub fn resolving(self, result: Result<Option<AccessControl>, Escalation>) -> Self {
        *self.result.lock() = result;
        self
    }

    pub fn failing_logout(self, escalation: Escalation) -> Self {
        *self.logout_result.lock() = Err(escalation);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn redirecting(mut self, location: &str) -> Self {
        self.challenge = ChallengeStyle::Redirect(location.to_string());
        self
    }

    pub fn set_result(&self, result: Result<Option<AccessControl>, Escalation>) {
        *self.result.lock() = result;
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl HttpSecurity for ScriptedSecurity {
    fn name(&self) -> &str {
        &self.name
    }

    fn credential_kind(&self) -> Option<CredentialKind> {
        self.kind
    }

    fn content_types(&self) -> &[String] {
        &self.content_types
    }

    fn ratify(&self, _credentials: Option<&Credentials>, _exchange: &Exchange) -> Ratification {
        self.calls.ratify.fetch_add(1, Ordering::SeqCst);
        self.ratification.lock().clone()
    }

    async fn authenticate(
        &self,
        _credentials: Option<Credentials>,
        _exchange: Arc<Exchange>,
    ) -> Result<Option<AccessControl>, Escalation> {
        self.calls.authenticate.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.lock().clone()
    }

    async fn challenge(&self, context: ChallengeContext<'_>) -> Result<(), Escalation> {
        self.calls.challenge.fetch_add(1, Ordering::SeqCst);
        match &self.challenge {
            ChallengeStyle::Fragment => {
                context
                    .accumulator
                    .add(ChallengeFragment::new(&self.name, format!("{} realm", self.name)));
            }
            ChallengeStyle::Redirect(location) => {
                let mut response = context.exchange.response();
                response.set_status(303);
                response.set_header("location", location.clone());
            }
        }
        Ok(())
    }

    async fn logout(&self, _exchange: Arc<Exchange>) -> Result<(), Escalation> {
        self.calls.logout.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.logout_result.lock().clone()
    }
}

pub fn exchange_for(request: RequestState) -> Arc<Exchange> {
    Exchange::new(ConnectionState::default(), request, Session::new())
}

pub fn get(path: &str) -> Arc<Exchange> {
    exchange_for(RequestState::new("GET", path))
}
