//! Account identification and credential types.
//!
//! The `AccountKey` is the sole sharding key for queueing, caching and
//! snapshot tracking: one key maps to exactly one external terminal session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for one external trading account.
///
/// Combines the terminal login, broker server name and the logical user id.
/// Stable across requests; everything in the gateway shards on this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    /// Terminal login id.
    pub login: u64,
    /// Broker server name (e.g., "Broker-Demo").
    pub server: String,
    /// Logical user id owning this account.
    pub user_id: String,
}

impl AccountKey {
    pub fn new(login: u64, server: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            login,
            server: server.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.login, self.server, self.user_id)
    }
}

/// Login credentials for one terminal session.
///
/// The Debug impl redacts the password so credentials can appear in
/// structured log fields without leaking secrets.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: u64,
    pub password: String,
    pub server: String,
}

impl Credentials {
    pub fn new(login: u64, password: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            login,
            password: password.into(),
            server: server.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key_display() {
        let key = AccountKey::new(12345, "Broker-Demo", "user-1");
        assert_eq!(key.to_string(), "12345@Broker-Demo/user-1");
    }

    #[test]
    fn test_account_key_equality_is_full_tuple() {
        let a = AccountKey::new(1, "srv", "u");
        let b = AccountKey::new(1, "srv", "u");
        let c = AccountKey::new(1, "srv", "other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new(42, "hunter2", "Broker-Live");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("hunter2"));
    }
}
