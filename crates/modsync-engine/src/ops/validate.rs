//! Startup validation of installed mods.

use modsync_core::{ModId, ModState};

use crate::context::Engine;

/// Demote subscribed `Installed` entries whose folder is gone.
///
/// Returns the ids that will be reinstalled.
pub async fn validate_installed_mods(engine: &Engine) -> Vec<ModId> {
    let candidates: Vec<(ModId, std::path::PathBuf)> = {
        let state = engine.store.read();
        state
            .system
            .filter_by_subscriptions(&state.subscriptions)
            .filter(|e| e.state() == ModState::Installed)
            .map(|e| (e.id(), e.path_on_disk().to_path_buf()))
            .collect()
    };

    let mut missing = Vec::new();
    for (id, path) in candidates {
        if !engine.fs().directory_exists(&path).await {
            missing.push(id);
        }
    }

    if !missing.is_empty() {
        let mut state = engine.store.write();
        for id in &missing {
            if let Some(entry) = state.system.get_mut(*id) {
                tracing::info!(
                    target: "modsync::validate",
                    mod_id = %id,
                    path = %entry.path_on_disk().display(),
                    "Installed mod is missing from disk, scheduling reinstall"
                );
                entry.update_size_on_disk(None);
                entry.set_state(ModState::InstallationPending);
            }
        }
    }
    missing
}
