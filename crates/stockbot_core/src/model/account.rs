//! Login account and session values.
//!
//! # Invariants
//! - `password_hash` is `SHA-256(salt || password)`; plaintext is never kept.
//! - A `Session` is an explicit value passed to gated calls, never a global.

use serde::{Deserialize, Serialize};

/// Persisted credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub salt: Vec<u8>,
    pub password_hash: Vec<u8>,
    pub is_admin: bool,
}

/// Identity of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub username: String,
    pub is_admin: bool,
}

/// Login state threaded through UI-level commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub current_user: Option<UserSession>,
}

impl Session {
    /// Session with nobody logged in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(username: impl Into<String>, is_admin: bool) -> Self {
        Self {
            current_user: Some(UserSession {
                username: username.into(),
                is_admin,
            }),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.current_user
            .as_ref()
            .is_some_and(|user| user.is_admin)
    }

    pub fn username(&self) -> Option<&str> {
        self.current_user.as_ref().map(|user| user.username.as_str())
    }

    /// Clears the current user.
    pub fn logout(&mut self) {
        self.current_user = None;
    }
}
