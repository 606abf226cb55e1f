//! Users known to the password based schemes.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::ConfiguredUser;
use crate::security::AccessControl;

/// SHA256 hex digest of a password, as stored in configuration.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl ConfiguredUser {
    /// Verify a password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        hash_password(password) == self.password_hash
    }

    /// Access control granted to this user by `scheme`.
    pub fn access_control(&self, scheme: &str) -> AccessControl {
        AccessControl::new(scheme, &self.username).with_roles(self.roles.iter().cloned())
    }
}

/// In-memory user store built from configuration.
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: HashMap<String, ConfiguredUser>,
}

impl UserStore {
    pub fn new(users: Vec<ConfiguredUser>) -> Self {
        let users = users
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect();
        Self { users }
    }

    pub fn find(&self, username: &str) -> Option<&ConfiguredUser> {
        self.users.get(username)
    }

    /// Authenticate a user with username and password.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&ConfiguredUser> {
        self.find(username)
            .filter(|user| user.verify_password(password))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_users() -> UserStore {
    UserStore::new(vec![
        ConfiguredUser {
            username: "alice".to_string(),
            password_hash: hash_password("wonderland"),
            roles: vec!["admin".to_string(), "member".to_string()],
        },
        ConfiguredUser {
            username: "bob".to_string(),
            password_hash: hash_password("builder"),
            roles: vec!["member".to_string()],
        },
    ])
}
