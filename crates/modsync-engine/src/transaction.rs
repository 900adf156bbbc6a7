//! Entry transactions for install and update pipelines.

use modsync_core::{ModCollectionEntry, ModError, ModId, ModResult};

use crate::session::{CollectionKind, SessionStore};

/// Scoped ownership of one entry's pipeline-owned fields.
///
/// The entry's state at `begin` is its rollback target. Unless
/// [`commit`](Self::commit) runs, dropping the transaction restores the
/// entry's pipeline-owned fields (every field except local subscriptions) to
/// the snapshot taken at `begin`. Mutations go through
/// [`with_entry`](Self::with_entry), which looks the entry up by id each time.
pub struct EntryTransaction<'a> {
    store: &'a SessionStore,
    kind: CollectionKind,
    id: ModId,
    snapshot: ModCollectionEntry,
    committed: bool,
}

impl<'a> EntryTransaction<'a> {
    /// Begin a transaction on `id`. Fails with `Cancelled` if the entry is gone.
    pub fn begin(store: &'a SessionStore, kind: CollectionKind, id: ModId) -> ModResult<Self> {
        let mut state = store.write();
        let entry = state
            .collection_mut(kind)
            .get_mut(id)
            .ok_or(ModError::Cancelled)?;
        let snapshot = entry.clone();
        entry.begin_transaction();
        Ok(Self {
            store,
            kind,
            id,
            snapshot,
            committed: false,
        })
    }

    pub const fn id(&self) -> ModId {
        self.id
    }

    /// Mutate the entry. Fails with `Cancelled` if it was removed meanwhile.
    pub fn with_entry<R>(&self, f: impl FnOnce(&mut ModCollectionEntry) -> R) -> ModResult<R> {
        let mut state = self.store.write();
        state
            .collection_mut(self.kind)
            .get_mut(self.id)
            .map(f)
            .ok_or(ModError::Cancelled)
    }

    /// Keep every change made during the transaction.
    pub fn commit(mut self) {
        self.committed = true;
        if let Some(entry) = self.store.write().collection_mut(self.kind).get_mut(self.id) {
            entry.commit_transaction();
        }
    }
}

impl Drop for EntryTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Some(entry) = self.store.write().collection_mut(self.kind).get_mut(self.id) {
            tracing::debug!(
                target: "modsync::transaction",
                mod_id = %self.id,
                from = %entry.state(),
                to = %self.snapshot.state(),
                "Rolling back entry"
            );
            entry.rollback_to(&self.snapshot);
        }
    }
}
