//! Connection, request and response state of one exchange.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::AuthnResult;

/// State that can be exported to a blob and later imported back.
pub trait StateSnapshot {
    fn export_state(&self) -> AuthnResult<Vec<u8>>;

    fn import_state(&mut self, blob: &[u8]) -> AuthnResult<()>;
}

macro_rules! json_snapshot {
    ($($state:ty),*) => {
        $(
            impl StateSnapshot for $state {
                fn export_state(&self) -> AuthnResult<Vec<u8>> {
                    Ok(serde_json::to_vec(self)?)
                }

                fn import_state(&mut self, blob: &[u8]) -> AuthnResult<()> {
                    *self = serde_json::from_slice(blob)?;
                    Ok(())
                }
            }
        )*
    };
}

json_snapshot!(ConnectionState, RequestState);

/// Transport level facts about the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

/// The request being serviced, including request-scoped attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestState {
    pub method: String,
    pub path: String,
    /// Header name/value pairs in arrival order. Names are lower case.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl RequestState {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Build from the parts of an incoming HTTP request.
    pub fn from_http(
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            method: method.as_str().to_string(),
            path: path_and_query.to_string(),
            headers,
            body,
            attributes: BTreeMap::new(),
        }
    }

    /// First value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and headers written by challenges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseState {
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

impl ResponseState {
    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
    }

    /// Replace all values of the named header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.add_header(name, value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether anything has been written to the sink.
    pub fn is_written(&self) -> bool {
        self.status.is_some() || !self.headers.is_empty()
    }
}

impl IntoResponse for ResponseState {
    fn into_response(self) -> Response {
        let status = self
            .status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::OK);

        let mut response = status.into_response();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                axum::http::HeaderName::try_from(name.as_str()),
                axum::http::HeaderValue::try_from(value.as_str()),
            ) {
                response.headers_mut().append(name, value);
            } else {
                tracing::warn!(header = %name, "Dropping invalid response header");
            }
        }
        response
    }
}
