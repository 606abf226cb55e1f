//! Bearer authentication with JWT access tokens.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::error::{AuthnError, AuthnResult, Escalation};
use crate::exchange::Exchange;
use crate::security::{
    AccessControl, ChallengeContext, ChallengeFragment, CredentialKind, Credentials, HttpSecurity,
    Ratification,
};

/// JWT claims for authenticated principals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal).
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at time (Unix timestamp).
    pub iat: i64,
    /// Issuer.
    pub iss: String,
}

/// JWT token manager.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    /// Token validity duration in hours.
    token_duration_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, issuer: String, token_duration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            token_duration_hours,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(
            &config.secret,
            config.issuer.clone(),
            config.token_duration_hours,
        )
    }

    pub fn token_duration_hours(&self) -> i64 {
        self.token_duration_hours
    }

    /// Issue a token for an authenticated principal.
    pub fn generate_token(&self, access_control: &AccessControl) -> AuthnResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_duration_hours);

        let claims = Claims {
            sub: access_control.principal().to_string(),
            roles: access_control.roles.iter().cloned().collect(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthnError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Validate and decode a JWT token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

pub struct BearerSecurity {
    name: String,
    realm: String,
    content_types: Vec<String>,
    jwt: JwtManager,
}

impl BearerSecurity {
    pub fn new(
        name: impl Into<String>,
        realm: impl Into<String>,
        content_types: Vec<String>,
        jwt: JwtManager,
    ) -> Self {
        Self {
            name: name.into(),
            realm: realm.into(),
            content_types,
            jwt,
        }
    }

    fn token(&self, supplied: Option<Credentials>, exchange: &Exchange) -> Option<String> {
        match supplied.or_else(|| Credentials::from_request(&exchange.request())) {
            Some(Credentials::Bearer { token }) => Some(token),
            _ => None,
        }
    }
}

#[async_trait]
impl HttpSecurity for BearerSecurity {
    fn name(&self) -> &str {
        &self.name
    }

    fn credential_kind(&self) -> Option<CredentialKind> {
        Some(CredentialKind::Bearer)
    }

    fn content_types(&self) -> &[String] {
        &self.content_types
    }

    fn ratify(&self, credentials: Option<&Credentials>, exchange: &Exchange) -> Ratification {
        match self.token(credentials.cloned(), exchange) {
            Some(_) => Ratification::Possible,
            None => Ratification::NotPossible,
        }
    }

    async fn authenticate(
        &self,
        credentials: Option<Credentials>,
        exchange: Arc<Exchange>,
    ) -> Result<Option<AccessControl>, Escalation> {
        let Some(token) = self.token(credentials, &exchange) else {
            return Ok(None);
        };

        match self.jwt.validate_token(&token) {
            Ok(claims) => Ok(Some(
                AccessControl::new(&self.name, claims.sub)
                    .with_roles(claims.roles)
                    .with_attribute("exp", claims.exp.into()),
            )),
            Err(e) => {
                tracing::debug!(scheme = %self.name, error = %e, "JWT validation failed");
                Ok(None)
            }
        }
    }

    async fn challenge(&self, context: ChallengeContext<'_>) -> Result<(), Escalation> {
        let mut fragment = ChallengeFragment::new("Bearer", &self.realm);

        // RFC 6750: tell the client its token was rejected
        if let Some(token) = self.token(None, context.exchange) {
            if self.jwt.validate_token(&token).is_err() {
                fragment = fragment
                    .with_param("error", "invalid_token")
                    .with_param("error_description", "The access token is invalid or expired");
            }
        }

        context.accumulator.add(fragment);
        Ok(())
    }

    async fn logout(&self, _exchange: Arc<Exchange>) -> Result<(), Escalation> {
        // Tokens are self-contained and expire on their own
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::exchange::RequestState;
    use crate::security::testing::{exchange_for, get};
    use crate::security::ChallengeAccumulator;

    fn manager() -> JwtManager {
        JwtManager::new("test-secret-key-12345", "authn-gate".to_string(), 24)
    }

    fn bearer() -> BearerSecurity {
        BearerSecurity::new("bearer", "api", vec!["application/json".to_string()], manager())
    }

    fn with_token(token: &str) -> Arc<Exchange> {
        exchange_for(
            RequestState::new("GET", "/v1/resource")
                .with_header("Authorization", format!("Bearer {token}")),
        )
    }

    async fn challenge_header(security: &BearerSecurity, exchange: &Exchange) -> String {
        let accumulator = ChallengeAccumulator::new();
        security
            .challenge(ChallengeContext {
                exchange,
                accumulator: &accumulator,
            })
            .await
            .unwrap();
        accumulator.header_value().unwrap()
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = manager();
        let control = AccessControl::new("bearer", "alice").with_roles(["admin"]);

        let token = manager.generate_token(&control).unwrap();

        let claims = manager.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.roles, vec!["admin"]);
        assert_eq!(claims.iss, "authn-gate");
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let other = JwtManager::new("test-secret-key-12345", "someone-else".to_string(), 24);
        let token = other
            .generate_token(&AccessControl::new("bearer", "mallory"))
            .unwrap();
        assert!(manager().validate_token(&token).is_err());
    }

    #[tokio::test]
    async fn test_valid_token_authenticates() {
        let token = manager()
            .generate_token(&AccessControl::new("bearer", "alice").with_roles(["member"]))
            .unwrap();
        let exchange = with_token(&token);
        let security = bearer();

        assert_eq!(security.ratify(None, &exchange), Ratification::Possible);
        let control = security.authenticate(None, exchange).await.unwrap().unwrap();
        assert_eq!(control.principal(), "alice");
        assert!(control.has_role("member"));
        assert!(control.attributes.contains_key("exp"));
    }

    #[tokio::test]
    async fn test_invalid_token_challenge_reports_error() {
        let exchange = with_token("not-a-jwt");
        let security = bearer();

        assert!(security
            .authenticate(None, Arc::clone(&exchange))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            challenge_header(&security, &exchange).await,
            r#"Bearer realm="api", error="invalid_token", error_description="The access token is invalid or expired""#
        );
    }

    #[tokio::test]
    async fn test_plain_challenge_without_token() {
        let exchange = get("/");
        assert_eq!(bearer().ratify(None, &exchange), Ratification::NotPossible);
        assert_eq!(
            challenge_header(&bearer(), &exchange).await,
            r#"Bearer realm="api""#
        );
    }
}
