//! Collects `WWW-Authenticate` fragments during one challenge round.

use parking_lot::Mutex;

use crate::exchange::ResponseState;

pub const WWW_AUTHENTICATE: &str = "www-authenticate";

/// One scheme's challenge, e.g. `Bearer realm="api", error="invalid_token"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeFragment {
    pub scheme: String,
    pub realm: String,
    pub params: Vec<(String, String)>,
}

impl ChallengeFragment {
    pub fn new(scheme: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            realm: realm.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

impl std::fmt::Display for ChallengeFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} realm=\"{}\"", self.scheme, quote(&self.realm))?;
        for (name, value) in &self.params {
            write!(f, ", {}=\"{}\"", name, quote(value))?;
        }
        Ok(())
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Challenge fragments added by the schemes of one round, in order.
#[derive(Debug, Default)]
pub struct ChallengeAccumulator {
    fragments: Mutex<Vec<ChallengeFragment>>,
}

impl ChallengeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, fragment: ChallengeFragment) {
        self.fragments.lock().push(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.lock().is_empty()
    }

    pub fn fragments(&self) -> Vec<ChallengeFragment> {
        self.fragments.lock().clone()
    }

    /// The combined header value, or `None` when nothing was added.
    pub fn header_value(&self) -> Option<String> {
        let fragments = self.fragments.lock();
        if fragments.is_empty() {
            return None;
        }
        Some(
            fragments
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Write the challenge to the response. An empty accumulator leaves the
    /// response as the challenges left it.
    ///
    /// Returns `true` when the response was written.
    pub fn flush(&self, response: &mut ResponseState) -> bool {
        match self.header_value() {
            Some(value) => {
                response.set_status(401);
                response.set_header(WWW_AUTHENTICATE, value);
                true
            }
            None => false,
        }
    }
}
