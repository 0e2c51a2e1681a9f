//! Session payload carried inside a sealed token.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role granted to a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::User => f.write_str("user"),
        }
    }
}

/// Identity of a signed-in user, sealed into the session cookie at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub user_name: String,
    pub user_email: String,
    pub user_role: Role,
    /// Staff identifier in the records backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_staff_id: Option<String>,
    /// Row identifier in the records backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl SessionPayload {
    pub fn new(user_name: impl Into<String>, user_email: impl Into<String>, user_role: Role) -> Self {
        Self {
            user_name: user_name.into(),
            user_email: user_email.into(),
            user_role,
            user_staff_id: None,
            record_id: None,
        }
    }

    pub fn with_staff_id(mut self, staff_id: impl Into<String>) -> Self {
        self.user_staff_id = Some(staff_id.into());
        self
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    /// A payload without an identity is never trusted, even if it decrypts.
    pub fn is_consistent(&self) -> bool {
        !self.user_email.trim().is_empty() && !self.user_name.trim().is_empty()
    }

    pub fn is_admin(&self) -> bool {
        self.user_role.is_admin()
    }
}
