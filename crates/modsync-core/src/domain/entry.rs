//! Collection entries and their retry bookkeeping.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::ids::{ModId, UserId};
use super::mod_info::ModInfo;
use super::state::ModState;
use crate::error::ModError;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts an entry gets per session.
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles with each further one.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay required after `attempts_used` failed attempts.
    #[must_use]
    pub fn backoff_for(&self, attempts_used: u32) -> Duration {
        if attempts_used == 0 {
            return Duration::ZERO;
        }
        let exp = attempts_used.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exp)
    }
}

/// Per-entry retry bookkeeping.
///
/// Only `never_retry` survives a restart; attempt counters start fresh each
/// session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    #[serde(skip)]
    attempts_used: u32,
    #[serde(skip)]
    last_attempt: Option<Instant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    never_retry: Option<ModError>,
}

impl RetryState {
    /// Failed attempts recorded this session.
    pub const fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Why the entry will not be retried this session, if so.
    pub const fn never_retry_reason(&self) -> Option<&ModError> {
        self.never_retry.as_ref()
    }

    /// Attempts left before the entry is skipped.
    pub const fn retries_remaining(&self, policy: &RetryPolicy) -> u32 {
        if self.never_retry.is_some() {
            return 0;
        }
        policy.max_retries.saturating_sub(self.attempts_used)
    }

    /// Whether another attempt is allowed at `now`.
    pub fn should_retry(&self, now: Instant, policy: &RetryPolicy) -> bool {
        if self.retries_remaining(policy) == 0 {
            return false;
        }
        match self.last_attempt {
            Some(last) => {
                now.saturating_duration_since(last) >= policy.backoff_for(self.attempts_used)
            }
            None => true,
        }
    }

    fn record_failure(&mut self, error: &ModError, now: Instant) {
        if error.is_cancelled() || error.is_busy() {
            return;
        }
        if error.prevents_retry() {
            self.never_retry = Some(error.clone());
        } else {
            self.attempts_used = self.attempts_used.saturating_add(1);
            self.last_attempt = Some(now);
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Local record of one mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModCollectionEntry {
    id: ModId,
    profile: ModInfo,
    state: ModState,
    #[serde(skip)]
    rollback_state: Option<ModState>,
    #[serde(skip)]
    uninstall_requested: bool,
    #[serde(default)]
    local_subscriptions: BTreeSet<UserId>,
    path_on_disk: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size_on_disk: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<ModError>,
    #[serde(default)]
    retry: RetryState,
}

impl ModCollectionEntry {
    /// Create an entry waiting for installation.
    pub fn new(profile: ModInfo, path_on_disk: impl Into<PathBuf>) -> Self {
        Self {
            id: profile.id,
            profile,
            state: ModState::InstallationPending,
            rollback_state: None,
            uninstall_requested: false,
            local_subscriptions: BTreeSet::new(),
            path_on_disk: path_on_disk.into(),
            size_on_disk: None,
            last_error: None,
            retry: RetryState::default(),
        }
    }

    pub const fn id(&self) -> ModId {
        self.id
    }

    pub const fn profile(&self) -> &ModInfo {
        &self.profile
    }

    pub const fn state(&self) -> ModState {
        self.state
    }

    pub const fn rollback_state(&self) -> Option<ModState> {
        self.rollback_state
    }

    pub fn path_on_disk(&self) -> &Path {
        &self.path_on_disk
    }

    pub const fn size_on_disk(&self) -> Option<u64> {
        self.size_on_disk
    }

    pub const fn last_error(&self) -> Option<&ModError> {
        self.last_error.as_ref()
    }

    pub const fn retry(&self) -> &RetryState {
        &self.retry
    }

    /// Number of local users subscribed to this mod.
    pub fn local_subscription_count(&self) -> usize {
        self.local_subscriptions.len()
    }

    /// Whether `user` holds a local subscription.
    pub fn is_subscribed_by(&self, user: UserId) -> bool {
        self.local_subscriptions.contains(&user)
    }

    /// Move to `next` if the state graph allows it.
    ///
    /// Returns `false` and leaves the entry untouched otherwise.
    pub fn set_state(&mut self, next: ModState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                target: "modsync::collection",
                mod_id = %self.id,
                from = %self.state,
                to = %next,
                "Rejected invalid state transition"
            );
            return false;
        }
        if self.state != next {
            tracing::debug!(
                target: "modsync::collection",
                mod_id = %self.id,
                from = %self.state,
                to = %next,
                "State transition"
            );
        }
        self.state = next;
        true
    }

    /// Replace the profile snapshot.
    ///
    /// An installed entry whose live modfile changed becomes `UpdatePending`.
    /// Returns whether that happened.
    pub fn update_profile(&mut self, profile: ModInfo) -> bool {
        let changed_file = profile.modfile_id() != self.profile.modfile_id();
        self.profile = profile;
        if changed_file && self.state == ModState::Installed {
            return self.set_state(ModState::UpdatePending);
        }
        false
    }

    /// Add a local subscription for `user`. Returns `false` if it existed.
    ///
    /// Resubscribing to an entry awaiting uninstall cancels the uninstall.
    pub fn add_local_subscription(&mut self, user: UserId) -> bool {
        let added = self.local_subscriptions.insert(user);
        self.uninstall_requested = false;
        if self.state == ModState::UninstallPending {
            let next = if self.size_on_disk.is_some() {
                ModState::Installed
            } else {
                ModState::InstallationPending
            };
            self.set_state(next);
        }
        added
    }

    /// Remove the local subscription of `user`. Returns `false` if absent.
    ///
    /// The last subscription going away marks the entry for uninstall.
    pub fn remove_local_subscription(&mut self, user: UserId) -> bool {
        let removed = self.local_subscriptions.remove(&user);
        if removed && self.local_subscriptions.is_empty() {
            self.mark_for_uninstall();
        }
        removed
    }

    /// Drop every local subscription and mark the entry for uninstall.
    pub fn clear_local_subscriptions(&mut self) {
        self.local_subscriptions.clear();
        self.mark_for_uninstall();
    }

    /// Mark the entry for uninstall regardless of subscriptions.
    ///
    /// An entry owned by a pipeline keeps its state; the request is applied
    /// when the pipeline commits or rolls back.
    pub fn mark_for_uninstall(&mut self) {
        if self.state.is_in_flight() {
            self.uninstall_requested = true;
        } else {
            self.set_state(ModState::UninstallPending);
        }
    }

    /// Record the rollback target when a transaction begins.
    pub const fn begin_transaction(&mut self) {
        self.rollback_state = Some(self.state);
    }

    /// Clear the rollback target once a transaction commits.
    pub fn commit_transaction(&mut self) {
        self.rollback_state = None;
        if std::mem::take(&mut self.uninstall_requested) {
            self.set_state(ModState::UninstallPending);
        }
    }

    /// Restore pipeline-owned fields from `snapshot`.
    ///
    /// Local subscriptions are owned by the subscription flows and survive,
    /// as does an uninstall requested while the transaction ran.
    pub fn rollback_to(&mut self, snapshot: &Self) {
        let subscriptions = std::mem::take(&mut self.local_subscriptions);
        let uninstall = self.uninstall_requested;
        *self = snapshot.clone();
        self.local_subscriptions = subscriptions;
        if uninstall {
            self.state = ModState::UninstallPending;
        }
    }

    /// Set the install location.
    pub fn set_path_on_disk(&mut self, path: impl Into<PathBuf>) {
        self.path_on_disk = path.into();
    }

    /// Record the extracted size.
    pub const fn update_size_on_disk(&mut self, size: Option<u64>) {
        self.size_on_disk = size;
    }

    /// Record a failed attempt.
    pub fn set_last_error(&mut self, error: ModError, now: Instant) {
        self.retry.record_failure(&error, now);
        self.last_error = Some(error);
    }

    /// Forget the last error and reset retry bookkeeping after success.
    pub fn clear_last_error(&mut self) {
        self.last_error = None;
        self.retry.reset();
    }

    /// Allow an entry marked never-retry to be attempted again.
    pub fn clear_never_retry(&mut self) {
        self.retry.never_retry = None;
    }

    /// Whether the scheduler may attempt this entry at `now`.
    pub fn should_retry(&self, now: Instant, policy: &RetryPolicy) -> bool {
        self.retry.should_retry(now, policy)
    }

    /// Copy suitable for the state document.
    ///
    /// Entries caught mid-transfer are stored in the pending state they
    /// started from, since the transfer will not resume after a restart.
    #[must_use]
    pub fn to_persisted(&self) -> Self {
        let mut copy = self.clone();
        if copy.state.is_in_flight() {
            copy.state = if copy.uninstall_requested {
                ModState::UninstallPending
            } else {
                copy.rollback_state
                    .filter(|s| !s.is_in_flight())
                    .unwrap_or(ModState::InstallationPending)
            };
        }
        copy.rollback_state = None;
        copy.uninstall_requested = false;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mod_info::FileMetadata;

    fn entry(id: i64) -> ModCollectionEntry {
        let profile = ModInfo::new(ModId::new(id), "test")
            .with_modfile(FileMetadata::new(1, ModId::new(id), "a.zip", 10));
        ModCollectionEntry::new(profile, format!("/mods/{id}"))
    }

    #[test]
    fn test_profile_change_marks_update() {
        let mut e = entry(1);
        e.set_state(ModState::Downloading);
        e.set_state(ModState::Extracting);
        e.set_state(ModState::Installed);

        let same = e.profile().clone();
        assert!(!e.update_profile(same));
        assert_eq!(e.state(), ModState::Installed);

        let newer = ModInfo::new(ModId::new(1), "test")
            .with_modfile(FileMetadata::new(2, ModId::new(1), "b.zip", 10));
        assert!(e.update_profile(newer));
        assert_eq!(e.state(), ModState::UpdatePending);
    }

    #[test]
    fn test_last_unsubscribe_marks_uninstall() {
        let mut e = entry(1);
        e.add_local_subscription(UserId::new(1));
        e.add_local_subscription(UserId::new(2));
        assert_eq!(e.local_subscription_count(), 2);

        e.remove_local_subscription(UserId::new(1));
        assert_eq!(e.state(), ModState::InstallationPending);

        e.remove_local_subscription(UserId::new(2));
        assert_eq!(e.state(), ModState::UninstallPending);
    }

    #[test]
    fn test_resubscribe_before_uninstall_restores_state() {
        let mut e = entry(1);
        e.add_local_subscription(UserId::new(1));
        e.remove_local_subscription(UserId::new(1));
        assert_eq!(e.state(), ModState::UninstallPending);

        e.add_local_subscription(UserId::new(1));
        assert_eq!(e.state(), ModState::InstallationPending);
    }

    #[test]
    fn test_unsubscribe_during_transfer_redirects_rollback() {
        let mut e = entry(1);
        e.add_local_subscription(UserId::new(1));
        let snapshot = e.clone();
        e.begin_transaction();
        e.set_state(ModState::Downloading);

        e.remove_local_subscription(UserId::new(1));
        assert_eq!(e.state(), ModState::Downloading);

        e.rollback_to(&snapshot);
        assert_eq!(e.state(), ModState::UninstallPending);
        assert_eq!(e.local_subscription_count(), 0);
    }

    #[test]
    fn test_retry_backoff() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_secs(2),
        };
        let mut e = entry(1);
        let t0 = Instant::now();
        assert!(e.should_retry(t0, &policy));

        e.set_last_error(ModError::network("reset"), t0);
        assert!(!e.should_retry(t0 + Duration::from_secs(1), &policy));
        assert!(e.should_retry(t0 + Duration::from_secs(2), &policy));

        let t1 = t0 + Duration::from_secs(2);
        e.set_last_error(ModError::network("reset"), t1);
        assert!(!e.should_retry(t1 + Duration::from_secs(60), &policy));
    }

    #[test]
    fn test_cancellation_consumes_nothing() {
        let policy = RetryPolicy::default();
        let mut e = entry(1);
        e.set_last_error(ModError::Cancelled, Instant::now());
        assert_eq!(e.retry().attempts_used(), 0);
        assert!(e.should_retry(Instant::now(), &policy));
    }

    #[test]
    fn test_never_retry() {
        let policy = RetryPolicy::default();
        let mut e = entry(1);
        e.set_last_error(ModError::not_found("mod 1"), Instant::now());
        assert!(!e.should_retry(Instant::now(), &policy));
        e.clear_never_retry();
        assert!(e.should_retry(Instant::now(), &policy));
    }

    #[test]
    fn test_persisted_form_uses_rollback_state() {
        let mut e = entry(1);
        e.set_state(ModState::Downloading);
        e.set_state(ModState::Extracting);
        e.set_state(ModState::Installed);
        e.set_state(ModState::UpdatePending);
        e.begin_transaction();
        e.set_state(ModState::Downloading);

        assert_eq!(e.to_persisted().state(), ModState::UpdatePending);
    }
}
