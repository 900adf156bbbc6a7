//! Suspension-point checks for long-running operations.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use modsync_core::{ModError, ModResult};

use crate::session::{LeaseId, SessionStore, TransferLease};

/// Validity checks shared by every step of one operation.
///
/// Each awaited step races the operation's token and is followed by a
/// re-check, so an operation whose session was shut down, whose mod
/// management was disabled, or whose transfer was cancelled resumes only to
/// return [`ModError::Cancelled`].
pub struct OperationGuard<'a> {
    store: &'a SessionStore,
    token: CancellationToken,
    requires_management: bool,
    lease: Option<LeaseId>,
}

impl<'a> OperationGuard<'a> {
    /// Guard for host-requested work that survives management toggles.
    pub fn foreground(store: &'a SessionStore) -> Self {
        Self {
            token: store.session_token(),
            store,
            requires_management: false,
            lease: None,
        }
    }

    /// Guard for work owned by mod management.
    pub fn managed(store: &'a SessionStore) -> ModResult<Self> {
        let (enabled, token) = {
            let state = store.read();
            (state.management.enabled, state.management.token.clone())
        };
        if !enabled {
            return Err(ModError::Cancelled);
        }
        Ok(Self {
            store,
            token,
            requires_management: true,
            lease: None,
        })
    }

    /// Tie the guard to a transfer lease.
    #[must_use]
    pub fn with_lease(mut self, lease: &TransferLease) -> Self {
        self.token = lease.token().clone();
        self.lease = Some(lease.id());
        self
    }

    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail with `Cancelled` if the operation is no longer valid.
    pub fn check(&self) -> ModResult<()> {
        if self.token.is_cancelled() {
            return Err(ModError::Cancelled);
        }
        if self.requires_management && !self.store.management_enabled() {
            return Err(ModError::Cancelled);
        }
        if let Some(lease) = self.lease {
            if !self.store.progress().is_live(lease) {
                return Err(ModError::Cancelled);
            }
        }
        Ok(())
    }

    /// Await `fut`, racing cancellation, then re-check before resuming.
    pub async fn step<T, F>(&self, fut: F) -> ModResult<T>
    where
        F: Future<Output = ModResult<T>>,
    {
        self.check()?;
        let result = tokio::select! {
            biased;
            () = self.token.cancelled() => Err(ModError::Cancelled),
            result = fut => result,
        };
        self.check()?;
        result
    }

    /// Like [`step`](Self::step) for infallible futures.
    pub async fn wait<T, F>(&self, fut: F) -> ModResult<T>
    where
        F: Future<Output = T>,
    {
        self.step(async { Ok(fut.await) }).await
    }
}
