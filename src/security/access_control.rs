//! Resolved access control for the current request.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Proof of identity produced by a scheme after successful authentication.
///
/// Schemes put anything scheme-specific in `attributes`. The whole value is
/// serializable so schemes can remember it in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessControl {
    /// Name of the scheme that authenticated the principal.
    pub scheme: String,
    pub principal: String,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl AccessControl {
    pub fn new(scheme: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            principal: principal.into(),
            roles: BTreeSet::new(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Combined view over every scheme that authenticated the request.
///
/// Scheme and principal come from the first authenticated scheme; role
/// membership is granted if any of them grants it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeAccessControl {
    controls: Vec<AccessControl>,
}

impl CompositeAccessControl {
    /// Returns `None` when there is nothing to combine.
    pub fn new(controls: Vec<AccessControl>) -> Option<Self> {
        if controls.is_empty() {
            None
        } else {
            Some(Self { controls })
        }
    }

    fn primary(&self) -> &AccessControl {
        &self.controls[0]
    }

    pub fn scheme(&self) -> &str {
        self.primary().scheme()
    }

    pub fn principal(&self) -> &str {
        self.primary().principal()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.controls.iter().any(|control| control.has_role(role))
    }

    /// Every access control contributing to this view, in scheme order.
    pub fn controls(&self) -> &[AccessControl] {
        &self.controls
    }
}
