//! Loading and saving the state and user-data documents.
//!
//! Documents are written to `<file>.tmp` and moved over the old file, so a
//! failed save leaves the previous document intact.

use std::path::Path;

use modsync_core::paths::temp_file_for;
use modsync_core::{FileSystemPort, ModResult, StateDocument, UserDataDocument};

use crate::context::Engine;

async fn write_atomic(fs: &dyn FileSystemPort, path: &Path, bytes: &[u8]) -> ModResult<()> {
    let tmp = temp_file_for(path);
    fs.write_file(&tmp, bytes).await?;
    if let Err(err) = fs.move_and_overwrite(&tmp, path).await {
        if let Err(cleanup) = fs.delete_file(&tmp).await {
            tracing::debug!(
                target: "modsync::storage",
                path = %tmp.display(),
                error = %cleanup,
                "Failed to remove temporary document"
            );
        }
        return Err(err);
    }
    Ok(())
}

async fn read_optional(fs: &dyn FileSystemPort, path: &Path) -> ModResult<Option<Vec<u8>>> {
    match fs.read_file(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Persist the system collection.
pub async fn save_state(engine: &Engine) -> ModResult<()> {
    let (path, bytes) = {
        let state = engine.store.read();
        let path = state.paths()?.state_file();
        (path, StateDocument::from_collection(&state.system).encode()?)
    };
    write_atomic(engine.fs(), &path, &bytes).await
}

/// Persist the user profile, subscriptions and deferred unsubscriptions.
pub async fn save_user_data(engine: &Engine) -> ModResult<()> {
    let (path, bytes) = {
        let state = engine.store.read();
        let path = state.paths()?.user_data_file();
        let doc = UserDataDocument {
            user: state.user.clone(),
            subscriptions: state.subscriptions.clone(),
            deferred_unsubscriptions: state.deferred_unsubscriptions.iter().copied().collect(),
            ..UserDataDocument::default()
        };
        (path, doc.encode()?)
    };
    write_atomic(engine.fs(), &path, &bytes).await
}

/// Save both documents, logging rather than failing.
///
/// Used after operations whose outcome is already decided; a failed save
/// only means the next session starts from the previous document.
pub async fn save_all_logged(engine: &Engine) {
    if let Err(err) = save_state(engine).await {
        tracing::warn!(target: "modsync::storage", error = %err, "Failed to save state");
    }
    if let Err(err) = save_user_data(engine).await {
        tracing::warn!(target: "modsync::storage", error = %err, "Failed to save user data");
    }
}

/// Load the system collection. A missing or unreadable document yields an
/// empty collection.
pub async fn load_state(engine: &Engine) -> ModResult<()> {
    let path = engine.paths()?.state_file();
    let collection = match read_optional(engine.fs(), &path).await? {
        Some(bytes) => match StateDocument::decode(&bytes) {
            Ok(doc) => doc.into_collection(),
            Err(err) => {
                tracing::warn!(
                    target: "modsync::storage",
                    path = %path.display(),
                    error = %err,
                    "Discarding unreadable state document"
                );
                modsync_core::ModCollection::new()
            }
        },
        None => modsync_core::ModCollection::new(),
    };
    tracing::debug!(
        target: "modsync::storage",
        entries = collection.len(),
        "Loaded state document"
    );
    engine.store.write().system = collection;
    Ok(())
}

/// Load the user document into the session.
pub async fn load_user_data(engine: &Engine) -> ModResult<()> {
    let path = engine.paths()?.user_data_file();
    let doc = match read_optional(engine.fs(), &path).await? {
        Some(bytes) => UserDataDocument::decode(&bytes).unwrap_or_else(|err| {
            tracing::warn!(
                target: "modsync::storage",
                path = %path.display(),
                error = %err,
                "Discarding unreadable user document"
            );
            UserDataDocument::default()
        }),
        None => UserDataDocument::default(),
    };
    let mut state = engine.store.write();
    state.user = doc.user;
    state.subscriptions = doc.subscriptions;
    state.deferred_unsubscriptions = doc.deferred_unsubscriptions.into_iter().collect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_engine as engine;
    use modsync_core::{ModId, ModInfo};

    #[tokio::test]
    async fn test_state_round_trips_through_filesystem() {
        let (engine, fakes) = engine();
        engine
            .store
            .write()
            .system
            .add_or_update_mod(ModInfo::new(ModId::new(8), "eight"), "/game/mods/8");
        save_state(&engine).await.unwrap();
        assert!(fakes.fs.get_file(Path::new("/game/metadata/state.json")).is_some());
        assert!(fakes.fs.get_file(Path::new("/game/metadata/state.json.tmp")).is_none());

        engine.store.write().system = modsync_core::ModCollection::new();
        load_state(&engine).await.unwrap();
        assert!(engine.store.read().system.contains(ModId::new(8)));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_document() {
        let (engine, fakes) = engine();
        let state_file = Path::new("/game/metadata/state.json");
        fakes.fs.put_file(state_file, b"previous".to_vec());
        fakes.fs.fail_moves_to(state_file);

        assert!(save_state(&engine).await.is_err());
        assert_eq!(fakes.fs.get_file(state_file).unwrap(), b"previous");
        assert!(fakes.fs.get_file(&temp_file_for(state_file)).is_none());
    }

    #[tokio::test]
    async fn test_corrupt_state_loads_empty() {
        let (engine, fakes) = engine();
        fakes
            .fs
            .put_file("/game/metadata/state.json", b"{not json".to_vec());
        load_state(&engine).await.unwrap();
        assert!(engine.store.read().system.is_empty());
    }

    #[tokio::test]
    async fn test_user_data_round_trip() {
        let (engine, _fakes) = engine();
        {
            let mut state = engine.store.write();
            state.subscriptions.add(ModId::new(3));
            state.deferred_unsubscriptions.insert(ModId::new(4));
        }
        save_user_data(&engine).await.unwrap();
        {
            let mut state = engine.store.write();
            state.subscriptions.clear();
            state.deferred_unsubscriptions.clear();
        }
        load_user_data(&engine).await.unwrap();
        let state = engine.store.read();
        assert!(state.subscriptions.contains(ModId::new(3)));
        assert!(state.deferred_unsubscriptions.contains(&ModId::new(4)));
    }
}
