//! Credentials supplied by a client and the kinds a scheme accepts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::exchange::RequestState;

/// Kind of credential a scheme knows how to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// `Authorization: Basic` username and password.
    Basic,
    /// `Authorization: Bearer` token.
    Bearer,
    /// Username and password submitted by an application login form.
    Form,
}

/// Credentials supplied for an explicit authentication attempt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
    Form { username: String, password: String },
}

impl std::fmt::Debug for Credentials {
    // Never print secrets
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish()
            }
            Credentials::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
            Credentials::Form { username, .. } => {
                f.debug_struct("Form").field("username", username).finish()
            }
        }
    }
}

impl Credentials {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credentials::Basic { .. } => CredentialKind::Basic,
            Credentials::Bearer { .. } => CredentialKind::Bearer,
            Credentials::Form { .. } => CredentialKind::Form,
        }
    }

    /// Parse an `Authorization` header value.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, rest) = value.trim().split_once(' ')?;
        let rest = rest.trim();

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD.decode(rest).ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (username, password) = decoded.split_once(':')?;
            return Some(Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            });
        }

        if scheme.eq_ignore_ascii_case("bearer") && !rest.is_empty() {
            return Some(Credentials::Bearer {
                token: rest.to_string(),
            });
        }

        None
    }

    /// Credentials carried by the request's `Authorization` header.
    pub fn from_request(request: &RequestState) -> Option<Self> {
        request
            .header("authorization")
            .and_then(Self::from_authorization)
    }

    /// Parse an `application/x-www-form-urlencoded` login body.
    pub fn from_form(body: &[u8]) -> Option<Self> {
        let mut username = None;
        let mut password = None;
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "username" => username = Some(value.into_owned()),
                "password" => password = Some(value.into_owned()),
                _ => {}
            }
        }

        Some(Credentials::Form {
            username: username?,
            password: password?,
        })
    }

    /// Present a username and password as `kind`. Tokens are left alone.
    pub fn into_kind(self, kind: CredentialKind) -> Self {
        match (self, kind) {
            (Credentials::Basic { username, password }, CredentialKind::Form)
            | (Credentials::Form { username, password }, CredentialKind::Form) => {
                Credentials::Form { username, password }
            }
            (Credentials::Basic { username, password }, CredentialKind::Basic)
            | (Credentials::Form { username, password }, CredentialKind::Basic) => {
                Credentials::Basic { username, password }
            }
            (credentials, _) => credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        // "alice:secret:with:colons"
        let header = format!("Basic {}", STANDARD.encode("alice:secret:with:colons"));
        let credentials = Credentials::from_authorization(&header).unwrap();

        assert_eq!(
            credentials,
            Credentials::Basic {
                username: "alice".to_string(),
                password: "secret:with:colons".to_string(),
            }
        );
        assert_eq!(credentials.kind(), CredentialKind::Basic);
    }

    #[test]
    fn test_parse_bearer_case_insensitive() {
        let credentials = Credentials::from_authorization("bearer abc.def.ghi").unwrap();
        assert_eq!(
            credentials,
            Credentials::Bearer {
                token: "abc.def.ghi".to_string()
            }
        );
    }

    #[test]
    fn test_reject_unknown_or_malformed() {
        assert!(Credentials::from_authorization("Digest foo").is_none());
        assert!(Credentials::from_authorization("Basic !!!").is_none());
        assert!(Credentials::from_authorization("Bearer").is_none());
    }

    #[test]
    fn test_parse_form() {
        let credentials = Credentials::from_form(b"username=bob&password=p%40ss&remember=1").unwrap();
        assert_eq!(
            credentials,
            Credentials::Form {
                username: "bob".to_string(),
                password: "p@ss".to_string(),
            }
        );

        assert!(Credentials::from_form(b"username=bob").is_none());
    }

    #[test]
    fn test_into_kind() {
        let form = Credentials::Form {
            username: "bob".to_string(),
            password: "builder".to_string(),
        };
        assert_eq!(
            form.into_kind(CredentialKind::Basic),
            Credentials::Basic {
                username: "bob".to_string(),
                password: "builder".to_string(),
            }
        );

        let token = Credentials::Bearer {
            token: "t".to_string(),
        };
        assert_eq!(token.clone().into_kind(CredentialKind::Form), token);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let credentials = Credentials::Bearer {
            token: "super-secret".to_string(),
        };
        assert!(!format!("{credentials:?}").contains("super-secret"));
    }
}
