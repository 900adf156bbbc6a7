//! The single transfer progress slot.
//!
//! At most one install, update or upload runs at a time. A pipeline claims
//! the slot with [`ProgressSlot::start`] and receives a [`TransferLease`];
//! the slot is released when the lease drops. Cancelling the transfer clears
//! the slot immediately, so adapters still holding a [`ProgressHandle`]
//! observe cancellation on their next check and their writes land nowhere.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use modsync_core::{ModId, ModProgressInfo, ModProgressState, ProgressSink};

/// Lease identifier for the slot's current occupant.
///
/// Used to ignore progress from a transfer that was cancelled or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(u64);

struct ActiveTransfer {
    lease: LeaseId,
    info: ModProgressInfo,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SlotInner {
    next_lease: u64,
    active: Option<ActiveTransfer>,
}

/// Holder of the one in-flight transfer's progress.
#[derive(Default)]
pub struct ProgressSlot {
    inner: Mutex<SlotInner>,
}

impl ProgressSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for `id`.
    ///
    /// Returns `None` when another transfer holds it. The lease's token is a
    /// child of `parent`, so cancelling `parent` cancels the transfer too.
    pub fn start(
        self: &Arc<Self>,
        id: ModId,
        parent: &CancellationToken,
    ) -> Option<TransferLease> {
        let mut inner = self.lock();
        if inner.active.is_some() {
            return None;
        }
        inner.next_lease += 1;
        let lease = LeaseId(inner.next_lease);
        let cancel = parent.child_token();
        inner.active = Some(ActiveTransfer {
            lease,
            info: ModProgressInfo::new(id),
            cancel: cancel.clone(),
        });
        drop(inner);

        Some(TransferLease {
            handle: ProgressHandle {
                slot: Arc::clone(self),
                lease,
                cancel,
            },
            id,
        })
    }

    /// Snapshot of the current transfer's progress.
    pub fn current(&self) -> Option<ModProgressInfo> {
        self.lock().active.as_ref().map(|a| a.info.clone())
    }

    /// Mod currently holding the slot.
    pub fn current_mod(&self) -> Option<ModId> {
        self.lock().active.as_ref().map(|a| a.info.id)
    }

    /// Whether `lease` still owns the slot.
    pub fn is_live(&self, lease: LeaseId) -> bool {
        self.lock().active.as_ref().is_some_and(|a| a.lease == lease)
    }

    /// Cancel the active transfer if it is for `id` (or for anything when
    /// `id` is `None`) and release the slot. Returns whether one was cancelled.
    pub fn cancel(&self, id: Option<ModId>) -> bool {
        let mut inner = self.lock();
        let matches = inner
            .active
            .as_ref()
            .is_some_and(|a| id.is_none_or(|id| a.info.id == id));
        if !matches {
            return false;
        }
        if let Some(active) = inner.active.take() {
            active.cancel.cancel();
            tracing::debug!(
                target: "modsync::progress",
                mod_id = %active.info.id,
                "Cancelled active transfer"
            );
        }
        true
    }

    fn with_active(&self, lease: LeaseId, f: impl FnOnce(&mut ModProgressInfo)) {
        let mut inner = self.lock();
        if let Some(active) = inner.active.as_mut().filter(|a| a.lease == lease) {
            f(&mut active.info);
        }
    }

    fn release(&self, lease: LeaseId) {
        let mut inner = self.lock();
        if inner.active.as_ref().is_some_and(|a| a.lease == lease) {
            inner.active = None;
        }
    }
}

/// Progress sink handed to adapters.
///
/// Writes are dropped once the lease no longer owns the slot.
#[derive(Clone)]
pub struct ProgressHandle {
    slot: Arc<ProgressSlot>,
    lease: LeaseId,
    cancel: CancellationToken,
}

impl ProgressSink for ProgressHandle {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || !self.slot.is_live(self.lease)
    }

    fn set_total(&self, total: u64) {
        self.slot.with_active(self.lease, |info| info.set_total(total));
    }

    fn add_progress(&self, bytes: u64) {
        self.slot.with_active(self.lease, |info| info.add_progress(bytes));
    }
}

/// Exclusive claim on the progress slot. Dropping it releases the slot.
pub struct TransferLease {
    handle: ProgressHandle,
    id: ModId,
}

impl TransferLease {
    pub const fn id(&self) -> LeaseId {
        self.handle.lease
    }

    pub const fn mod_id(&self) -> ModId {
        self.id
    }

    /// Token cancelled when this transfer is cancelled.
    pub const fn token(&self) -> &CancellationToken {
        &self.handle.cancel
    }

    /// A sink for adapters.
    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        Arc::new(self.handle.clone())
    }

    /// Move the transfer into `state`, resetting that phase's counter.
    pub fn begin_phase(&self, state: ModProgressState) {
        self.handle
            .slot
            .with_active(self.handle.lease, |info| info.begin_phase(state));
    }

    pub fn is_live(&self) -> bool {
        !self.handle.is_cancelled()
    }
}

impl Drop for TransferLease {
    fn drop(&mut self) {
        self.handle.slot.release(self.handle.lease);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_admits_one_transfer() {
        let slot = Arc::new(ProgressSlot::new());
        let root = CancellationToken::new();

        let lease = slot.start(ModId::new(1), &root).unwrap();
        assert!(slot.start(ModId::new(2), &root).is_none());
        assert_eq!(slot.current_mod(), Some(ModId::new(1)));

        drop(lease);
        assert!(slot.current().is_none());
        assert!(slot.start(ModId::new(2), &root).is_some());
    }

    #[test]
    fn test_cancel_detaches_stale_handles() {
        let slot = Arc::new(ProgressSlot::new());
        let root = CancellationToken::new();
        let lease = slot.start(ModId::new(1), &root).unwrap();
        let sink = lease.sink();
        lease.begin_phase(ModProgressState::Downloading);
        sink.set_total(100);
        sink.add_progress(40);
        assert_eq!(
            slot.current().unwrap().counter(ModProgressState::Downloading).current,
            40
        );

        assert!(!slot.cancel(Some(ModId::new(2))));
        assert!(slot.cancel(Some(ModId::new(1))));
        assert!(sink.is_cancelled());
        assert!(slot.current().is_none());

        // A new occupant is not affected by the stale handle or lease drop.
        let next = slot.start(ModId::new(2), &root).unwrap();
        sink.add_progress(10);
        drop(lease);
        assert_eq!(slot.current_mod(), Some(ModId::new(2)));
        assert!(next.is_live());
    }

    #[test]
    fn test_parent_token_cancels_lease() {
        let slot = Arc::new(ProgressSlot::new());
        let root = CancellationToken::new();
        let lease = slot.start(ModId::new(3), &root).unwrap();
        root.cancel();
        assert!(!lease.is_live());
        assert!(lease.token().is_cancelled());
    }
}
