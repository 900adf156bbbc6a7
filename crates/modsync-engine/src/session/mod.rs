//! Session store: the one owner of all per-session state.
//!
//! # Concurrency Model
//!
//! - `SessionState` sits behind a `std::sync::RwLock`; guards are never held
//!   across an await point. Pipelines re-read state by [`ModId`] after every
//!   suspension instead of holding references into a collection.
//! - Foreground queries take the shutdown lock shared, `reset` takes it
//!   exclusively, so a query never observes a half-torn-down session.
//! - Lock order: shutdown → state → progress slot.

mod progress;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use indexmap::{IndexMap, IndexSet};
use tokio_util::sync::CancellationToken;

use modsync_core::{
    AuthenticatedUser, CreateModFileParams, ModCollection, ModError, ModEventLog, ModId,
    ModManagementEvent, ModManagementEventType, ModPaths, ModResult, RetryPolicy,
    SessionOptions, UserId, UserSubscriptionList,
};

use crate::ops::CompletionQueue;
use crate::temp_mods::TempModSet;

pub use progress::{LeaseId, ProgressHandle, ProgressSlot, TransferLease};

/// Callback receiving mod management events.
pub type ManagementCallback = Arc<dyn Fn(ModManagementEvent) + Send + Sync>;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    NotInitialized,
    Initializing,
    Initialized,
}

/// Which collection an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Subscription-driven installs, persisted across sessions.
    System,
    /// Temporary mod set installs, discarded on shutdown.
    Temp,
}

/// Mod management switch and the token its work runs under.
pub struct ManagementState {
    pub enabled: bool,
    pub token: CancellationToken,
    pub callback: Option<ManagementCallback>,
}

/// Flags forcing the next read of a resource to bypass the response cache.
#[derive(Debug, Default)]
pub struct CacheFlags {
    pub subscriptions_invalid: bool,
    pub invalid_mods: BTreeSet<ModId>,
}

/// Everything a session knows.
pub struct SessionState {
    pub init: InitState,
    pub options: SessionOptions,
    pub paths: Option<ModPaths>,
    pub system: ModCollection,
    pub temp: ModCollection,
    pub temp_set: Option<TempModSet>,
    pub user: Option<AuthenticatedUser>,
    pub subscriptions: UserSubscriptionList,
    /// Unsubscriptions applied locally whose server call failed.
    pub deferred_unsubscriptions: IndexSet<ModId>,
    /// Queued modfile uploads, FIFO.
    pub pending_uploads: IndexMap<ModId, CreateModFileParams>,
    /// Mod whose transfer the scheduler should pick next.
    pub priority: Option<ModId>,
    pub rate_limited_until: Option<Instant>,
    pub cache: CacheFlags,
    pub events: ModEventLog,
    pub management: ManagementState,
    /// Cancelled on shutdown.
    pub session_token: CancellationToken,
}

impl SessionState {
    fn new() -> Self {
        let session_token = CancellationToken::new();
        Self {
            init: InitState::NotInitialized,
            options: SessionOptions::default(),
            paths: None,
            system: ModCollection::new(),
            temp: ModCollection::new(),
            temp_set: None,
            user: None,
            subscriptions: UserSubscriptionList::default(),
            deferred_unsubscriptions: IndexSet::new(),
            pending_uploads: IndexMap::new(),
            priority: None,
            rate_limited_until: None,
            cache: CacheFlags::default(),
            events: ModEventLog::default(),
            management: ManagementState {
                enabled: false,
                token: session_token.child_token(),
                callback: None,
            },
            session_token,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.init == InitState::Initialized
    }

    pub fn paths(&self) -> ModResult<&ModPaths> {
        self.paths.as_ref().ok_or(ModError::NotInitialized)
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        self.options.retry_policy()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.user_id)
    }

    /// The user's access token if it has not expired.
    pub fn access_token(&self) -> Option<String> {
        self.user
            .as_ref()
            .and_then(|u| u.valid_token(chrono::Utc::now()))
            .map(str::to_owned)
    }

    pub fn is_rate_limited(&self, now: Instant) -> bool {
        self.rate_limited_until.is_some_and(|until| now < until)
    }

    pub const fn collection(&self, kind: CollectionKind) -> &ModCollection {
        match kind {
            CollectionKind::System => &self.system,
            CollectionKind::Temp => &self.temp,
        }
    }

    pub const fn collection_mut(&mut self, kind: CollectionKind) -> &mut ModCollection {
        match kind {
            CollectionKind::System => &mut self.system,
            CollectionKind::Temp => &mut self.temp,
        }
    }

    /// Install folder for `id` in `kind`'s storage area.
    pub fn install_path(&self, kind: CollectionKind, id: ModId) -> ModResult<PathBuf> {
        let paths = self.paths()?;
        Ok(match kind {
            CollectionKind::System => paths.mod_install_path(id),
            CollectionKind::Temp => paths.temp_mod_install_path(id),
        })
    }

    /// Storage quota of `kind`, if any.
    pub const fn quota(&self, kind: CollectionKind) -> Option<u64> {
        match kind {
            CollectionKind::System => self.options.mod_storage_quota,
            CollectionKind::Temp => self.options.temp_mod_storage_quota,
        }
    }

    /// Whether `id` is part of the open temporary mod set.
    pub fn in_temp_set(&self, id: ModId) -> bool {
        self.temp_set.as_ref().is_some_and(|set| set.contains(id))
    }

    pub fn record_event(
        &mut self,
        id: ModId,
        event: ModManagementEventType,
        status: Option<ModError>,
    ) {
        if event.is_begin() {
            self.events.begin(id, event);
        } else {
            self.events.finish(id, event, status);
        }
    }
}

/// Shared owner of [`SessionState`], the progress slot and the completion
/// queue.
pub struct SessionStore {
    state: RwLock<SessionState>,
    shutdown_lock: RwLock<()>,
    progress: Arc<ProgressSlot>,
    completions: Arc<CompletionQueue>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::new()),
            shutdown_lock: RwLock::new(()),
            progress: Arc::new(ProgressSlot::new()),
            completions: Arc::new(CompletionQueue::new()),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a foreground query against a consistent snapshot.
    pub fn query<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let _shutdown = self
            .shutdown_lock
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&self.read())
    }

    pub const fn progress(&self) -> &Arc<ProgressSlot> {
        &self.progress
    }

    pub const fn completions(&self) -> &Arc<CompletionQueue> {
        &self.completions
    }

    /// Move from `NotInitialized` to `Initializing`. Returns `false` if the
    /// session was not in `NotInitialized`.
    pub fn begin_initialize(&self, options: SessionOptions) -> bool {
        let mut state = self.write();
        if state.init != InitState::NotInitialized {
            return false;
        }
        state.init = InitState::Initializing;
        state.options = options;
        true
    }

    pub fn session_token(&self) -> CancellationToken {
        self.read().session_token.clone()
    }

    pub fn management_enabled(&self) -> bool {
        self.read().management.enabled
    }

    pub fn management_token(&self) -> CancellationToken {
        self.read().management.token.clone()
    }

    /// Apply session-wide consequences of an API failure.
    ///
    /// A rate limit starts the cooldown; a rejected token is discarded.
    pub fn note_api_error(&self, error: &ModError) {
        match error {
            ModError::RateLimited { retry_after_secs } => {
                let mut state = self.write();
                let cooldown = if *retry_after_secs > 0 {
                    std::time::Duration::from_secs(*retry_after_secs)
                } else {
                    state.options.rate_limit_cooldown()
                };
                state.rate_limited_until = Some(Instant::now() + cooldown);
                tracing::warn!(
                    target: "modsync::session",
                    cooldown_secs = cooldown.as_secs(),
                    "Rate limited by the catalog"
                );
            }
            ModError::NotAuthenticated => {
                if let Some(user) = self.write().user.as_mut() {
                    user.invalidate_token();
                    tracing::warn!(
                        target: "modsync::session",
                        user_id = %user.user_id,
                        "Access token rejected, discarding it"
                    );
                }
            }
            _ => {}
        }
    }

    /// Cancel all session work and return to `NotInitialized`.
    ///
    /// Pending completions stay queued so the host still receives them.
    pub fn reset(&self) {
        let _shutdown = self
            .shutdown_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.progress.cancel(None);
        let mut state = self.write();
        state.session_token.cancel();
        *state = SessionState::new();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
