//! Precondition checks run before an operation does any work.
//!
//! Checks chain in the order the host should see failures:
//!
//! ```text
//! Precheck::new(&state)
//!     .initialized()?
//!     .not_rate_limited()?
//!     .authenticated()?
//!     .valid_mod(id)?;
//! ```

use std::time::Instant;

use modsync_core::{ModError, ModId, ModResult};

use crate::session::SessionState;

/// A chain of checks over one state snapshot.
pub struct Precheck<'a> {
    state: &'a SessionState,
    now: Instant,
}

impl<'a> Precheck<'a> {
    pub fn new(state: &'a SessionState) -> Self {
        Self {
            state,
            now: Instant::now(),
        }
    }

    pub fn initialized(self) -> ModResult<Self> {
        if self.state.is_initialized() {
            Ok(self)
        } else {
            Err(ModError::NotInitialized)
        }
    }

    pub fn not_rate_limited(self) -> ModResult<Self> {
        match self.state.rate_limited_until {
            Some(until) if self.now < until => Err(ModError::RateLimited {
                retry_after_secs: until.saturating_duration_since(self.now).as_secs().max(1),
            }),
            _ => Ok(self),
        }
    }

    pub fn authenticated(self) -> ModResult<Self> {
        if self.state.access_token().is_some() {
            Ok(self)
        } else {
            Err(ModError::NotAuthenticated)
        }
    }

    pub fn management_enabled(self) -> ModResult<Self> {
        if self.state.management.enabled {
            Ok(self)
        } else {
            Err(ModError::ModManagementDisabled)
        }
    }

    pub fn management_disabled(self) -> ModResult<Self> {
        if self.state.management.enabled {
            Err(ModError::ModManagementAlreadyEnabled)
        } else {
            Ok(self)
        }
    }

    pub const fn valid_mod(self, id: ModId) -> ModResult<Self> {
        if id.is_valid() {
            Ok(self)
        } else {
            Err(ModError::InvalidModId { id: id.get() })
        }
    }

    pub fn not_subscribed(self, id: ModId) -> ModResult<Self> {
        if self.state.subscriptions.contains(id) {
            Err(ModError::AlreadySubscribed { id: id.get() })
        } else {
            Ok(self)
        }
    }

    /// The current user must not hold a subscription to `id`.
    pub fn not_subscribed_by_user(self, id: ModId) -> ModResult<Self> {
        let subscribed = self.state.user_id().is_some_and(|user| {
            self.state
                .system
                .get(id)
                .is_some_and(|e| e.is_subscribed_by(user))
        });
        if subscribed || self.state.subscriptions.contains(id) {
            Err(ModError::StillSubscribed { id: id.get() })
        } else {
            Ok(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InitState, SessionStore};
    use modsync_core::{AuthenticatedUser, UserId};
    use std::time::Duration;

    #[test]
    fn test_checks_fail_in_order() {
        let store = SessionStore::new();
        let result = Precheck::new(&store.read())
            .initialized()
            .and_then(Precheck::authenticated)
            .map(|_| ());
        assert!(matches!(result, Err(ModError::NotInitialized)));

        store.write().init = InitState::Initialized;
        let result = Precheck::new(&store.read())
            .initialized()
            .and_then(Precheck::authenticated)
            .map(|_| ());
        assert!(matches!(result, Err(ModError::NotAuthenticated)));

        store.write().user = Some(AuthenticatedUser::new(UserId::new(1), "u", "t"));
        let result = Precheck::new(&store.read())
            .initialized()
            .and_then(Precheck::authenticated)
            .and_then(|p| p.valid_mod(ModId::INVALID))
            .map(|_| ());
        assert!(matches!(result, Err(ModError::InvalidModId { id: -1 })));
    }

    #[test]
    fn test_rate_limit_reports_remaining_seconds() {
        let store = SessionStore::new();
        store.write().rate_limited_until = Some(Instant::now() + Duration::from_secs(30));
        let err = Precheck::new(&store.read())
            .not_rate_limited()
            .err()
            .unwrap();
        assert!(matches!(err, ModError::RateLimited { retry_after_secs } if retry_after_secs <= 30));
    }
}
