use std::path::Path;

use modsync_core::testing::{EXTRACTED_FILE, FakeCall, FakeServices};
use modsync_core::{
    CreateModFileParams, FileSystemPort, ModCollectionEntry, ModError, ModId, ModState,
};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::context::Engine;
use crate::session::CollectionKind;
use crate::test_support::{USER, managed_engine};

fn track(engine: &Engine, fakes: &FakeServices, id: i64, payload: &[u8]) -> ModId {
    let info = fakes.catalog.add_mod(id, payload.to_vec());
    let mut state = engine.store.write();
    let path = state.install_path(CollectionKind::System, info.id).unwrap();
    state
        .system
        .add_or_update_mod(info.clone(), path)
        .add_local_subscription(USER);
    state.subscriptions.add(info.id);
    info.id
}

fn entry(engine: &Engine, id: ModId) -> ModCollectionEntry {
    engine.store.read().system.get(id).cloned().unwrap()
}

// =============================================================================
// Install
// =============================================================================

#[tokio::test]
async fn test_install_extracts_and_cleans_up() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");

    install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap();

    let e = entry(&engine, id);
    assert_eq!(e.state(), ModState::Installed);
    assert_eq!(e.size_on_disk(), Some(7));
    assert_eq!(e.rollback_state(), None);
    assert_eq!(
        fakes.fs.get_file(&Path::new("/game/mods/7").join(EXTRACTED_FILE)),
        Some(b"payload".to_vec())
    );
    assert!(fakes.fs.files_under(Path::new("/game/downloads")).is_empty());
    assert!(engine.store.progress().current().is_none());
}

#[tokio::test]
async fn test_update_replaces_installed_content() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"v1");
    install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap();

    let newer = fakes.catalog.publish_update(7, b"version two".to_vec());
    engine
        .store
        .write()
        .system
        .get_mut(id)
        .unwrap()
        .update_profile(newer.clone());
    assert_eq!(entry(&engine, id).state(), ModState::UpdatePending);

    install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap();
    let e = entry(&engine, id);
    assert_eq!(e.state(), ModState::Installed);
    assert_eq!(e.profile().modfile_id(), newer.modfile_id());
    assert_eq!(
        fakes.fs.get_file(&Path::new("/game/mods/7").join(EXTRACTED_FILE)),
        Some(b"version two".to_vec())
    );
}

#[tokio::test]
async fn test_quota_exceeded_leaves_entry_untouched() {
    let (engine, fakes) = managed_engine();
    let installed = track(&engine, &fakes, 1, b"12345678");
    install_or_update_mod(&engine, CollectionKind::System, installed)
        .await
        .unwrap();
    engine.store.write().options.mod_storage_quota = Some(10);

    let id = track(&engine, &fakes, 7, b"12345");
    let before = entry(&engine, id);
    let err = install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap_err();

    assert!(matches!(err, ModError::InsufficientSpace { required: 13, available: 10 }));
    assert_eq!(entry(&engine, id), before);
    assert!(!fakes.fs.directory_exists(Path::new("/game/mods/7")).await);
    assert_eq!(fakes.catalog.download_count(), 1);
}

#[tokio::test]
async fn test_failed_extraction_rolls_back_and_reuses_download() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    let before = entry(&engine, id);

    fakes
        .archiver
        .fail_next_extract(ModError::io("InvalidData", "corrupt archive"));
    let err = install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap_err();
    assert!(matches!(err, ModError::Io { .. }));
    assert_eq!(entry(&engine, id), before);
    assert!(!fakes.fs.directory_exists(Path::new("/game/mods/7")).await);

    install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap();
    assert_eq!(fakes.catalog.download_count(), 1);
    assert_eq!(entry(&engine, id).state(), ModState::Installed);
}

#[tokio::test]
async fn test_network_failure_rolls_back() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    let before = entry(&engine, id);

    fakes
        .catalog
        .fail_next(FakeCall::Download, ModError::network("connection reset"));
    let err = install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(entry(&engine, id), before);
}

#[tokio::test]
async fn test_stuck_partial_download_keeps_network_error() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    let before = entry(&engine, id);
    fakes.fs.fail_deletes_of("/game/downloads/7_7.zip");

    fakes
        .catalog
        .fail_next(FakeCall::Download, ModError::network("connection reset"));
    let err = install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap_err();
    assert!(matches!(err, ModError::Network { .. }));
    assert_eq!(entry(&engine, id), before);
}

#[tokio::test]
async fn test_busy_slot_fails_fast() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    let root = CancellationToken::new();
    let _held = engine.store.progress().start(ModId::new(99), &root).unwrap();

    let err = install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap_err();
    assert_eq!(err, ModError::ModBeingProcessed { id: 99 });
    assert!(err.is_busy());
    assert_eq!(entry(&engine, id).state(), ModState::InstallationPending);
    assert_eq!(fakes.catalog.download_count(), 0);
}

#[tokio::test]
async fn test_unsubscribe_mid_download_ends_uninstall_pending() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    let _gate = fakes.catalog.gate_downloads();
    let started = fakes.catalog.download_started();

    let (result, ()) = tokio::join!(
        install_or_update_mod(&engine, CollectionKind::System, id),
        async {
            started.notified().await;
            assert_eq!(entry(&engine, id).state(), ModState::Downloading);
            engine.store.progress().cancel(Some(id));
            engine
                .store
                .write()
                .system
                .get_mut(id)
                .unwrap()
                .remove_local_subscription(USER);
        }
    );

    assert_eq!(result, Err(ModError::Cancelled));
    let e = entry(&engine, id);
    assert_eq!(e.state(), ModState::UninstallPending);
    assert_eq!(e.rollback_state(), None);
    assert!(engine.store.progress().current().is_none());
}

#[tokio::test]
async fn test_disabled_management_cancels_install() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    engine.store.write().management.enabled = false;

    let err = install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

// =============================================================================
// Uninstall
// =============================================================================

#[tokio::test]
async fn test_uninstall_removes_folder_and_entry() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap();
    engine
        .store
        .write()
        .system
        .get_mut(id)
        .unwrap()
        .remove_local_subscription(USER);

    uninstall_mod(&engine, CollectionKind::System, id, false)
        .await
        .unwrap();
    assert!(!engine.store.read().system.contains(id));
    assert!(!fakes.fs.directory_exists(Path::new("/game/mods/7")).await);
}

#[tokio::test]
async fn test_uninstall_of_missing_folder_succeeds() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    engine
        .store
        .write()
        .system
        .get_mut(id)
        .unwrap()
        .remove_local_subscription(USER);

    uninstall_mod(&engine, CollectionKind::System, id, false)
        .await
        .unwrap();
    assert!(!engine.store.read().system.contains(id));
}

#[tokio::test]
async fn test_locked_folder_keeps_entry() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap();
    engine
        .store
        .write()
        .system
        .get_mut(id)
        .unwrap()
        .remove_local_subscription(USER);
    fakes.fs.fail_deletes_of("/game/mods/7");

    let err = uninstall_mod(&engine, CollectionKind::System, id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ModError::Io { .. }));
    assert_eq!(entry(&engine, id).state(), ModState::UninstallPending);
}

#[tokio::test]
async fn test_resubscribe_during_uninstall_reinstalls() {
    let (engine, fakes) = managed_engine();
    let id = track(&engine, &fakes, 7, b"payload");
    install_or_update_mod(&engine, CollectionKind::System, id)
        .await
        .unwrap();
    {
        let mut state = engine.store.write();
        let e = state.system.get_mut(id).unwrap();
        e.remove_local_subscription(USER);
        e.add_local_subscription(USER);
    }

    uninstall_mod(&engine, CollectionKind::System, id, false)
        .await
        .unwrap();
    let e = entry(&engine, id);
    assert_eq!(e.state(), ModState::InstallationPending);
    assert_eq!(e.size_on_disk(), None);
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_compresses_and_submits() {
    let (engine, fakes) = managed_engine();
    fakes.catalog.add_mod(5, b"x".to_vec());
    fakes.fs.put_file("/src/mod/data.pak", b"data".to_vec());
    engine.store.write().pending_uploads.insert(
        ModId::new(5),
        CreateModFileParams::new("/src/mod").with_version("1.0.1"),
    );

    let submitted = upload_modfile(&engine, ModId::new(5)).await.unwrap();
    assert_eq!(submitted.mod_id, ModId::new(5));

    let uploads = fakes.catalog.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, ModId::new(5));
    assert!(fakes.fs.get_file(Path::new("/game/uploads/5.zip")).is_none());
    let state = engine.store.read();
    assert!(state.pending_uploads.is_empty());
    assert!(state.cache.invalid_mods.contains(&ModId::new(5)));
}

#[tokio::test]
async fn test_failed_upload_is_not_requeued() {
    let (engine, fakes) = managed_engine();
    fakes.fs.put_file("/src/mod/data.pak", b"data".to_vec());
    engine
        .store
        .write()
        .pending_uploads
        .insert(ModId::new(5), CreateModFileParams::new("/src/mod"));
    fakes
        .catalog
        .fail_next(FakeCall::Upload, ModError::network("timeout"));

    assert!(upload_modfile(&engine, ModId::new(5)).await.is_err());
    assert!(engine.store.read().pending_uploads.is_empty());
    assert!(fakes.fs.get_file(Path::new("/game/uploads/5.zip")).is_none());
}

#[tokio::test]
async fn test_cancelled_upload_returns_to_queue_front() {
    let (engine, fakes) = managed_engine();
    fakes.fs.put_file("/src/mod/data.pak", b"data".to_vec());
    {
        let mut state = engine.store.write();
        state
            .pending_uploads
            .insert(ModId::new(5), CreateModFileParams::new("/src/mod"));
        state
            .pending_uploads
            .insert(ModId::new(6), CreateModFileParams::new("/src/other"));
    }
    fakes.catalog.fail_next(FakeCall::Upload, ModError::Cancelled);

    let err = upload_modfile(&engine, ModId::new(5)).await.unwrap_err();
    assert!(err.is_cancelled());

    let queued: Vec<_> = engine
        .store
        .read()
        .pending_uploads
        .keys()
        .copied()
        .collect();
    assert_eq!(queued, vec![ModId::new(5), ModId::new(6)]);
    assert_eq!(
        engine.store.read().pending_uploads[&ModId::new(5)].root_directory,
        Path::new("/src/mod")
    );
    assert!(fakes.fs.get_file(Path::new("/game/uploads/5.zip")).is_none());
    assert!(fakes.catalog.uploads().is_empty());
}
