//! Snapshot queries.

use indexmap::IndexMap;

use modsync_core::{ModCollectionEntry, ModId, ModProgressInfo, ModState};

use super::ModManager;
use crate::temp_mods;

/// Entries keyed by mod id, in collection order.
pub type EntryMap = IndexMap<ModId, ModCollectionEntry>;

fn keyed<'a>(entries: impl Iterator<Item = &'a ModCollectionEntry>) -> EntryMap {
    entries.map(|e| (e.id(), e.clone())).collect()
}

impl ModManager {
    /// Progress of the transfer in flight, if any.
    pub fn query_current_mod_update(&self) -> Option<ModProgressInfo> {
        self.engine
            .store
            .query(|_| self.engine.store.progress().current())
    }

    /// The current user's subscriptions, installed or not.
    pub fn query_user_subscriptions(&self) -> EntryMap {
        self.engine
            .store
            .query(|state| keyed(state.system.filter_by_subscriptions(&state.subscriptions)))
    }

    /// The current user's subscriptions that are ready to load.
    ///
    /// With `include_outdated`, installed mods waiting for an update count
    /// too.
    pub fn query_user_installations(&self, include_outdated: bool) -> EntryMap {
        self.engine.store.query(|state| {
            keyed(
                state
                    .system
                    .filter_by_subscriptions(&state.subscriptions)
                    .filter(|e| match e.state() {
                        ModState::Installed => true,
                        ModState::UpdatePending => include_outdated,
                        _ => false,
                    }),
            )
        })
    }

    /// Every mod with content on disk, whichever local user installed it.
    pub fn query_system_installations(&self) -> EntryMap {
        self.engine.store.query(|state| {
            keyed(state.system.iter().filter(|e| {
                matches!(
                    e.state(),
                    ModState::Installed | ModState::UpdatePending | ModState::UninstallPending
                )
            }))
        })
    }

    /// Entries backing the open temporary mod set.
    pub fn query_temp_mod_set(&self) -> EntryMap {
        self.engine
            .store
            .query(|state| keyed(temp_mods::query(state).iter()))
    }

    /// Unsubscriptions still waiting to reach the server.
    pub fn query_deferred_unsubscriptions(&self) -> Vec<ModId> {
        self.engine
            .store
            .query(|state| state.deferred_unsubscriptions.iter().copied().collect())
    }
}
