//! Choice of the management loop's next action.
//!
//! Priority, highest first:
//!
//! 1. system uninstalls (mods used by the temporary set are kept)
//! 2. temp uninstalls, then temp installs, then temp profile lookups
//! 3. the prioritized mod (its upload, or its install/update)
//! 4. the oldest queued upload
//! 5. installs and updates of subscribed mods
//!
//! Within a tier, entries with more retries left go first, then collection
//! order. Entries in backoff or parked for the session are skipped.

use std::time::Instant;

use modsync_core::{ModCollection, ModId, ModManagementEventType, ModState, RetryPolicy};

use crate::session::{CollectionKind, SessionState};

/// One unit of work for the management loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Uninstall { kind: CollectionKind, id: ModId },
    Install { kind: CollectionKind, id: ModId, update: bool },
    ResolveTempProfile { id: ModId },
    Upload { id: ModId },
}

impl NextAction {
    pub const fn mod_id(self) -> ModId {
        match self {
            Self::Uninstall { id, .. }
            | Self::Install { id, .. }
            | Self::ResolveTempProfile { id }
            | Self::Upload { id } => id,
        }
    }

    /// Begin/finish event pair reported for this action.
    ///
    /// Profile lookups for the temporary set have no events of their own.
    pub const fn events(self) -> Option<(ModManagementEventType, ModManagementEventType)> {
        match self {
            Self::Uninstall { .. } => Some((
                ModManagementEventType::BeginUninstall,
                ModManagementEventType::Uninstalled,
            )),
            Self::Install { update: true, .. } => Some((
                ModManagementEventType::BeginUpdate,
                ModManagementEventType::Updated,
            )),
            Self::Install { update: false, .. } => Some((
                ModManagementEventType::BeginInstall,
                ModManagementEventType::Installed,
            )),
            Self::ResolveTempProfile { .. } => None,
            Self::Upload { .. } => Some((
                ModManagementEventType::BeginUpload,
                ModManagementEventType::Uploaded,
            )),
        }
    }

    pub const fn collection(self) -> Option<CollectionKind> {
        match self {
            Self::Uninstall { kind, .. } | Self::Install { kind, .. } => Some(kind),
            Self::ResolveTempProfile { .. } | Self::Upload { .. } => None,
        }
    }
}

fn install_action(collection: &ModCollection, kind: CollectionKind, id: ModId) -> NextAction {
    let update = collection
        .get(id)
        .is_some_and(|e| e.state() == ModState::UpdatePending);
    NextAction::Install { kind, id, update }
}

fn next_temp_action(state: &SessionState, now: Instant, policy: &RetryPolicy) -> Option<NextAction> {
    let kind = CollectionKind::Temp;
    if let Some(id) = state
        .temp
        .next_retryable(now, policy, |s| s == ModState::UninstallPending)
    {
        return Some(NextAction::Uninstall { kind, id });
    }
    if let Some(id) = state.temp.next_retryable(now, policy, ModState::needs_transfer) {
        return Some(install_action(&state.temp, kind, id));
    }
    state
        .temp_set
        .as_ref()
        .and_then(|set| set.next_unresolved())
        .map(|id| NextAction::ResolveTempProfile { id })
}

fn priority_action(state: &SessionState, now: Instant, policy: &RetryPolicy) -> Option<NextAction> {
    let id = state.priority?;
    if state.pending_uploads.contains_key(&id) {
        return Some(NextAction::Upload { id });
    }
    let entry = state.system.get(id)?;
    (state.subscriptions.contains(id)
        && entry.state().needs_transfer()
        && entry.should_retry(now, policy))
    .then(|| install_action(&state.system, CollectionKind::System, id))
}

/// Pick the next action, or `None` when there is nothing to do.
pub fn select_next_action(state: &SessionState, now: Instant) -> Option<NextAction> {
    let policy = state.retry_policy();

    let uninstall = state
        .system
        .sorted_by_retry_priority(&policy)
        .into_iter()
        .find(|e| {
            e.state() == ModState::UninstallPending
                && !state.in_temp_set(e.id())
                && e.should_retry(now, &policy)
        });
    if let Some(entry) = uninstall {
        return Some(NextAction::Uninstall {
            kind: CollectionKind::System,
            id: entry.id(),
        });
    }

    if let Some(action) = next_temp_action(state, now, &policy) {
        return Some(action);
    }

    if let Some(action) = priority_action(state, now, &policy) {
        return Some(action);
    }

    if let Some(&id) = state.pending_uploads.keys().next() {
        return Some(NextAction::Upload { id });
    }

    state
        .system
        .sorted_by_retry_priority(&policy)
        .into_iter()
        .find(|e| {
            state.subscriptions.contains(e.id())
                && e.state().needs_transfer()
                && e.should_retry(now, &policy)
        })
        .map(|e| install_action(&state.system, CollectionKind::System, e.id()))
}
