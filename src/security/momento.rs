//! Snapshot of the request that triggered a challenge, replayed after login.

use serde::{Deserialize, Serialize};

use crate::error::AuthnResult;
use crate::exchange::{ConnectionState, Exchange, RequestState, StateSnapshot};
use crate::session::Session;

/// Session attribute holding the captured momento.
pub const MOMENTO_ATTRIBUTE: &str = "security.request_momento";

/// Connection and request state exported from a live exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMomento {
    connection: Vec<u8>,
    request: Vec<u8>,
}

impl RequestMomento {
    /// Export the exchange's current connection and request state.
    pub fn capture(exchange: &Exchange) -> AuthnResult<Self> {
        let connection = exchange.connection().export_state()?;
        let request = exchange.request().export_state()?;
        Ok(Self {
            connection,
            request,
        })
    }

    /// Store in the session unless a momento is already stored, by this
    /// request or any other on the same session.
    ///
    /// Returns `true` when this momento was stored.
    pub async fn store_if_absent(&self, session: &Session) -> AuthnResult<bool> {
        let blob = serde_json::to_vec(self)?;
        session.claim_attribute(MOMENTO_ATTRIBUTE, blob).await
    }

    pub fn is_stored(session: &Session) -> bool {
        session.get_attribute(MOMENTO_ATTRIBUTE).is_some()
    }

    /// The momento stored in the session, left in place.
    pub fn load(session: &Session) -> AuthnResult<Option<Self>> {
        session
            .get_attribute(MOMENTO_ATTRIBUTE)
            .map(|blob| serde_json::from_slice(&blob))
            .transpose()
            .map_err(Into::into)
    }

    /// Remove the stored momento and return it. Only one request of the
    /// session receives it.
    pub async fn take(session: &Session) -> AuthnResult<Option<Self>> {
        session
            .take_attribute(MOMENTO_ATTRIBUTE)
            .await?
            .map(|blob| serde_json::from_slice(&blob))
            .transpose()
            .map_err(Into::into)
    }

    /// Import the captured state into the live exchange. Nothing is changed
    /// unless both blobs import.
    pub fn restore(&self, exchange: &Exchange) -> AuthnResult<()> {
        let mut connection = ConnectionState::default();
        connection.import_state(&self.connection)?;
        let mut request = RequestState::new("GET", "/");
        request.import_state(&self.request)?;

        *exchange.connection() = connection;
        *exchange.request() = request;
        Ok(())
    }
}
