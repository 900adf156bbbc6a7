//! Local subscription list and diffing against the catalog.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::collection::ModCollection;
use super::ids::ModId;
use super::mod_info::ModInfo;
use super::state::ModState;

/// Kind of difference between the local list and the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Subscribed remotely, missing locally.
    Added,
    /// Present locally, no longer subscribed remotely.
    Removed,
    /// Installed locally, but the catalog has a newer modfile.
    Updated,
}

/// Diff keyed by mod id.
pub type SubscriptionChanges = BTreeMap<ModId, ChangeType>;

/// Mods the authenticated user is subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserSubscriptionList {
    ids: IndexSet<ModId>,
}

impl UserSubscriptionList {
    /// Add `id`. Returns `false` if it was already present.
    pub fn add(&mut self, id: ModId) -> bool {
        self.ids.insert(id)
    }

    /// Remove `id`. Returns `false` if it was absent.
    pub fn remove(&mut self, id: ModId) -> bool {
        self.ids.shift_remove(&id)
    }

    pub fn contains(&self, id: ModId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ModId> + '_ {
        self.ids.iter().copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Added/Removed diff of `self` against the authoritative `server` list.
    pub fn calculate_changes(&self, server: &Self) -> SubscriptionChanges {
        let mut changes = SubscriptionChanges::new();
        for id in server.iter().filter(|id| !self.contains(*id)) {
            changes.insert(id, ChangeType::Added);
        }
        for id in self.iter().filter(|id| !server.contains(*id)) {
            changes.insert(id, ChangeType::Removed);
        }
        changes
    }
}

impl FromIterator<ModId> for UserSubscriptionList {
    fn from_iter<I: IntoIterator<Item = ModId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Mods whose installed modfile differs from the one in `profiles`.
///
/// Entries already awaiting an update count as updated too, so a preview run
/// after profiles were applied still reports them.
pub fn calculate_updates(collection: &ModCollection, profiles: &[ModInfo]) -> SubscriptionChanges {
    profiles
        .iter()
        .filter_map(|profile| {
            let entry = collection.get(profile.id)?;
            let outdated = match entry.state() {
                ModState::Installed => entry.profile().modfile_id() != profile.modfile_id(),
                ModState::UpdatePending => true,
                _ => false,
            };
            outdated.then_some((profile.id, ChangeType::Updated))
        })
        .collect()
}

/// Layer `updates` under `changes`; Added/Removed win for the same id.
pub fn merge_changes(
    mut changes: SubscriptionChanges,
    updates: SubscriptionChanges,
) -> SubscriptionChanges {
    for (id, change) in updates {
        changes.entry(id).or_insert(change);
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mod_info::FileMetadata;

    fn list(ids: &[i64]) -> UserSubscriptionList {
        ids.iter().copied().map(ModId::new).collect()
    }

    #[test]
    fn test_calculate_changes() {
        let local = list(&[1, 2, 3]);
        let server = list(&[2, 3, 4]);

        let changes = local.calculate_changes(&server);
        assert_eq!(changes.get(&ModId::new(1)), Some(&ChangeType::Removed));
        assert_eq!(changes.get(&ModId::new(4)), Some(&ChangeType::Added));
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_identical_lists_produce_no_changes() {
        let local = list(&[5, 6]);
        assert!(local.calculate_changes(&local.clone()).is_empty());
    }

    #[test]
    fn test_updates_merge_under_added_removed() {
        let mut collection = ModCollection::new();
        let old = ModInfo::new(ModId::new(1), "a")
            .with_modfile(FileMetadata::new(10, ModId::new(1), "a.zip", 1));
        let entry = collection.add_or_update_mod(old, "/m/1");
        entry.set_state(ModState::Downloading);
        entry.set_state(ModState::Extracting);
        entry.set_state(ModState::Installed);

        let newer = ModInfo::new(ModId::new(1), "a")
            .with_modfile(FileMetadata::new(11, ModId::new(1), "a.zip", 1));
        let updates = calculate_updates(&collection, &[newer]);
        assert_eq!(updates.get(&ModId::new(1)), Some(&ChangeType::Updated));

        let mut changes = SubscriptionChanges::new();
        changes.insert(ModId::new(1), ChangeType::Removed);
        let merged = merge_changes(changes, updates);
        assert_eq!(merged.get(&ModId::new(1)), Some(&ChangeType::Removed));
    }
}
