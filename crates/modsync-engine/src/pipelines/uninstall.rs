//! Uninstall pipeline.

use modsync_core::{ModError, ModId, ModResult};

use crate::context::Engine;
use crate::ops::OperationGuard;
use crate::session::CollectionKind;

/// Delete `id`'s install folder and drop its entry.
///
/// A folder that is already gone counts as deleted. Without `force` the
/// entry is kept if a local user subscribed again while the folder was being
/// deleted; the next pass reinstalls it.
pub async fn uninstall_mod(
    engine: &Engine,
    kind: CollectionKind,
    id: ModId,
    force: bool,
) -> ModResult<()> {
    let guard = OperationGuard::managed(&engine.store)?;
    let path = {
        let state = engine.store.read();
        state
            .collection(kind)
            .get(id)
            .map(|e| e.path_on_disk().to_path_buf())
            .ok_or(ModError::Cancelled)?
    };

    tracing::debug!(
        target: "modsync::uninstall",
        mod_id = %id,
        path = %path.display(),
        "Deleting mod folder"
    );
    match guard.step(engine.fs().delete_folder(&path)).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => {
            tracing::debug!(target: "modsync::uninstall", mod_id = %id, "Mod folder already gone");
        }
        Err(err) => return Err(err),
    }

    let mut state = engine.store.write();
    let collection = state.collection_mut(kind);
    if collection.remove_mod(id, force).is_none() {
        if let Some(entry) = collection.get_mut(id) {
            entry.update_size_on_disk(None);
            entry.set_state(modsync_core::ModState::InstallationPending);
        }
        return Ok(());
    }
    state.cache.invalid_mods.remove(&id);
    if state.priority == Some(id) {
        state.priority = None;
    }
    tracing::info!(target: "modsync::uninstall", mod_id = %id, "Mod uninstalled");
    Ok(())
}
