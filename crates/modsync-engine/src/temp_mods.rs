//! Temporary mod sets.
//!
//! A temporary mod set installs mods outside the user's subscriptions, into
//! their own storage area with their own quota. Mods the system collection
//! already has installed are served from there. Each temp entry holds a
//! local subscription for [`TEMP_SET_HOLDER`], so removing a mod from the set
//! (or closing it) goes through the same uninstall marking as an
//! unsubscription, including while the mod is mid-transfer.

use indexmap::IndexSet;

use modsync_core::{
    ApiRequest, CachePolicy, ModCollectionEntry, ModError, ModId, ModInfo, ModResult, ModState,
    UserId,
};

use crate::context::Engine;
use crate::ops::OperationGuard;
use crate::session::{CollectionKind, SessionState};

/// Subscription holder standing in for the open temporary mod set.
pub const TEMP_SET_HOLDER: UserId = UserId::new(0);

/// Mods requested by the open temporary mod set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempModSet {
    ids: IndexSet<ModId>,
    /// Requested mods whose profile has not been fetched yet.
    unresolved: IndexSet<ModId>,
}

impl TempModSet {
    pub fn contains(&self, id: ModId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ModId> + '_ {
        self.ids.iter().copied()
    }

    /// First mod still waiting for its profile.
    pub fn next_unresolved(&self) -> Option<ModId> {
        self.unresolved.first().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn served_by_system(state: &SessionState, id: ModId) -> bool {
    state
        .system
        .get(id)
        .is_some_and(|e| matches!(e.state(), ModState::Installed | ModState::UpdatePending))
}

/// Open the set with `ids`. An already open set gains them.
pub fn open(state: &mut SessionState, ids: &[ModId]) {
    if state.temp_set.is_none() {
        tracing::info!(target: "modsync::temp", mods = ids.len(), "Opening temporary mod set");
        state.temp_set = Some(TempModSet::default());
    }
    add(state, ids);
}

/// Add `ids` to the open set.
pub fn add(state: &mut SessionState, ids: &[ModId]) {
    for &id in ids {
        let newly_added = state
            .temp_set
            .as_mut()
            .is_some_and(|set| set.ids.insert(id));
        if !newly_added || served_by_system(state, id) {
            continue;
        }
        if let Some(entry) = state.temp.get_mut(id) {
            entry.add_local_subscription(TEMP_SET_HOLDER);
        } else if let Some(set) = state.temp_set.as_mut() {
            set.unresolved.insert(id);
        }
    }
}

/// Remove `ids` from the open set; their temp installs are marked for
/// uninstall.
pub fn remove(state: &mut SessionState, ids: &[ModId]) {
    for &id in ids {
        if let Some(set) = state.temp_set.as_mut() {
            set.ids.shift_remove(&id);
            set.unresolved.shift_remove(&id);
        }
        if let Some(entry) = state.temp.get_mut(id) {
            entry.remove_local_subscription(TEMP_SET_HOLDER);
        }
    }
}

/// Close the set, marking every temp install for uninstall.
pub fn close(state: &mut SessionState) {
    if state.temp_set.take().is_some() {
        tracing::info!(target: "modsync::temp", "Closing temporary mod set");
    }
    for entry in state.temp.iter_mut() {
        entry.remove_local_subscription(TEMP_SET_HOLDER);
    }
}

/// Entries backing the open set, from the temp collection or, failing that,
/// the system collection.
pub fn query(state: &SessionState) -> Vec<ModCollectionEntry> {
    let Some(set) = state.temp_set.as_ref() else {
        return Vec::new();
    };
    set.ids()
        .filter_map(|id| state.temp.get(id).or_else(|| state.system.get(id)))
        .cloned()
        .collect()
}

/// Fetch the profile of a requested mod and create its temp entry.
pub async fn resolve_profile(engine: &Engine, id: ModId) -> ModResult<()> {
    let guard = OperationGuard::managed(&engine.store)?;
    let cache = CachePolicy::unless_invalidated(engine.store.read().cache.invalid_mods.contains(&id));
    let result = engine
        .request::<ModInfo>(&guard, ApiRequest::GetMod { mod_id: id }, cache)
        .await;

    let mut state = engine.store.write();
    if state.temp_set.is_none() {
        return Ok(());
    }
    match result {
        Ok(profile) => {
            let path = state.install_path(CollectionKind::Temp, id)?;
            if let Some(set) = state.temp_set.as_mut() {
                set.unresolved.shift_remove(&id);
            }
            if state.in_temp_set(id) && !served_by_system(&state, id) {
                state
                    .temp
                    .add_or_update_mod(profile, path)
                    .add_local_subscription(TEMP_SET_HOLDER);
            }
            Ok(())
        }
        Err(err) => {
            if !err.is_cancelled() && !err.is_recoverable() {
                if let Some(set) = state.temp_set.as_mut() {
                    set.unresolved.shift_remove(&id);
                }
            }
            Err(err)
        }
    }
}

/// Fail with `TempModSetNotInitialized` unless a set is open.
pub fn require_open(state: &SessionState) -> ModResult<()> {
    if state.temp_set.is_some() {
        Ok(())
    } else {
        Err(ModError::TempModSetNotInitialized)
    }
}
