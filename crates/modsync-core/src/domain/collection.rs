//! Insertion-ordered mod collections.

use std::path::PathBuf;
use std::time::Instant;

use indexmap::IndexMap;

use super::entry::{ModCollectionEntry, RetryPolicy};
use super::ids::ModId;
use super::mod_info::ModInfo;
use super::state::ModState;
use super::subscriptions::UserSubscriptionList;

/// Keyed set of entries, iterated in insertion order.
///
/// Entries are addressed by [`ModId`]; nothing outside the collection holds a
/// reference to an entry across an await point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModCollection {
    entries: IndexMap<ModId, ModCollectionEntry>,
}

impl ModCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `InstallationPending` entry, or refresh the profile of an
    /// existing one.
    pub fn add_or_update_mod(
        &mut self,
        profile: ModInfo,
        path_on_disk: impl Into<PathBuf>,
    ) -> &mut ModCollectionEntry {
        let id = profile.id;
        match self.entries.entry(id) {
            indexmap::map::Entry::Occupied(slot) => {
                let entry = slot.into_mut();
                entry.update_profile(profile);
                entry
            }
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(ModCollectionEntry::new(profile, path_on_disk))
            }
        }
    }

    /// Insert a fully formed entry, replacing any existing one.
    pub fn insert(&mut self, entry: ModCollectionEntry) {
        self.entries.insert(entry.id(), entry);
    }

    pub fn get(&self, id: ModId) -> Option<&ModCollectionEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ModId) -> Option<&mut ModCollectionEntry> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: ModId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModCollectionEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ModCollectionEntry> {
        self.entries.values_mut()
    }

    /// Remove an entry.
    ///
    /// Without `force`, entries that still have local subscribers are kept and
    /// `None` is returned.
    pub fn remove_mod(&mut self, id: ModId, force: bool) -> Option<ModCollectionEntry> {
        let entry = self.entries.get(&id)?;
        if !force && entry.local_subscription_count() > 0 {
            tracing::debug!(
                target: "modsync::collection",
                mod_id = %id,
                subscribers = entry.local_subscription_count(),
                "Refusing to remove subscribed entry"
            );
            return None;
        }
        self.entries.shift_remove(&id)
    }

    /// Entries whose id is in `subscriptions`, in collection order.
    pub fn filter_by_subscriptions<'a>(
        &'a self,
        subscriptions: &'a UserSubscriptionList,
    ) -> impl Iterator<Item = &'a ModCollectionEntry> + 'a {
        self.entries
            .values()
            .filter(move |e| subscriptions.contains(e.id()))
    }

    /// Entries in retry priority order: most retries remaining first, then
    /// insertion order.
    pub fn sorted_by_retry_priority(&self, policy: &RetryPolicy) -> Vec<&ModCollectionEntry> {
        let mut sorted: Vec<_> = self.entries.values().collect();
        sorted.sort_by_key(|e| std::cmp::Reverse(e.retry().retries_remaining(policy)));
        sorted
    }

    /// First entry in `state_filter` that may be retried at `now`, in retry
    /// priority order.
    pub fn next_retryable(
        &self,
        now: Instant,
        policy: &RetryPolicy,
        state_filter: impl Fn(ModState) -> bool,
    ) -> Option<ModId> {
        self.sorted_by_retry_priority(policy)
            .into_iter()
            .find(|e| state_filter(e.state()) && e.should_retry(now, policy))
            .map(ModCollectionEntry::id)
    }
}

impl FromIterator<ModCollectionEntry> for ModCollection {
    fn from_iter<I: IntoIterator<Item = ModCollectionEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.id(), e)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::UserId;
    use crate::error::ModError;

    fn profile(id: i64) -> ModInfo {
        ModInfo::new(ModId::new(id), format!("mod {id}"))
    }

    #[test]
    fn test_add_or_update_keeps_insertion_order() {
        let mut c = ModCollection::new();
        c.add_or_update_mod(profile(3), "/m/3");
        c.add_or_update_mod(profile(1), "/m/1");
        c.add_or_update_mod(profile(3), "/m/3");

        let ids: Vec<_> = c.iter().map(|e| e.id().get()).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_remove_respects_subscribers() {
        let mut c = ModCollection::new();
        c.add_or_update_mod(profile(1), "/m/1")
            .add_local_subscription(UserId::new(9));

        assert!(c.remove_mod(ModId::new(1), false).is_none());
        assert!(c.contains(ModId::new(1)));
        assert!(c.remove_mod(ModId::new(1), true).is_some());
        assert!(c.is_empty());
    }

    #[test]
    fn test_filter_by_subscriptions() {
        let mut c = ModCollection::new();
        for id in 1..=4 {
            c.add_or_update_mod(profile(id), format!("/m/{id}"));
        }
        let mut subs = UserSubscriptionList::default();
        subs.add(ModId::new(4));
        subs.add(ModId::new(2));

        let ids: Vec<_> = c.filter_by_subscriptions(&subs).map(|e| e.id().get()).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn test_retry_priority_prefers_fresh_entries() {
        let policy = RetryPolicy::default();
        let now = Instant::now();
        let mut c = ModCollection::new();
        c.add_or_update_mod(profile(1), "/m/1")
            .set_last_error(ModError::network("reset"), now);
        c.add_or_update_mod(profile(2), "/m/2");

        let order: Vec<_> = c
            .sorted_by_retry_priority(&policy)
            .iter()
            .map(|e| e.id().get())
            .collect();
        assert_eq!(order, vec![2, 1]);

        let next = c.next_retryable(now, &policy, ModState::needs_transfer);
        assert_eq!(next, Some(ModId::new(2)));
    }
}
