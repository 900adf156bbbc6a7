//! Authenticated user profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// The local user the session acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
    /// OAuth access token. `None` once the catalog rejected it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl AuthenticatedUser {
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            access_token: Some(access_token.into()),
            token_expires_at: None,
        }
    }

    #[must_use]
    pub const fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.token_expires_at = Some(expires_at);
        self
    }

    /// Token usable at `now`.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.token_expires_at.is_some_and(|exp| exp <= now) {
            return None;
        }
        self.access_token.as_deref()
    }

    /// Forget the token after the catalog rejected it.
    pub fn invalidate_token(&mut self) {
        self.access_token = None;
    }
}
