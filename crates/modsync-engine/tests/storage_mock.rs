//! Persistence against a mocked filesystem: exact calls on failure paths.

mod common;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::{Sequence, mock};

use modsync_core::testing::FakeServices;
use modsync_core::{FileSystemPort, ModError, ModId, ModInfo, ModResult};
use modsync_engine::ops::storage::{load_state, save_state};

use common::engine_with_fs;

mock! {
    pub Fs {}

    #[async_trait]
    impl FileSystemPort for Fs {
        async fn file_exists(&self, path: &Path) -> bool;
        async fn directory_exists(&self, path: &Path) -> bool;
        async fn file_size(&self, path: &Path) -> ModResult<u64>;
        async fn create_folder(&self, path: &Path) -> ModResult<()>;
        async fn delete_file(&self, path: &Path) -> ModResult<()>;
        async fn delete_folder(&self, path: &Path) -> ModResult<()>;
        async fn read_file(&self, path: &Path) -> ModResult<Vec<u8>>;
        async fn write_file(&self, path: &Path, data: &[u8]) -> ModResult<()>;
        async fn move_and_overwrite(&self, from: &Path, to: &Path) -> ModResult<()>;
        async fn check_space_available(&self, path: &Path, required: u64) -> ModResult<bool>;
    }
}

#[tokio::test]
async fn failed_move_removes_temporary_document() {
    let mut fs = MockFs::new();
    let mut seq = Sequence::new();
    fs.expect_write_file()
        .withf(|path, _| path.ends_with("metadata/state.json.tmp"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    fs.expect_move_and_overwrite()
        .withf(|from, to| from.ends_with("state.json.tmp") && to.ends_with("state.json"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(ModError::io("PermissionDenied", "locked")));
    fs.expect_delete_file()
        .withf(|path| path.ends_with("state.json.tmp"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let fakes = FakeServices::new();
    let engine = engine_with_fs(&fakes, Arc::new(fs));
    engine
        .store
        .write()
        .system
        .add_or_update_mod(ModInfo::new(ModId::new(3), "three"), "/game/mods/3");

    let err = save_state(&engine).await.unwrap_err();
    assert!(matches!(err, ModError::Io { .. }));
}

#[tokio::test]
async fn unreadable_state_document_starts_empty() {
    let mut fs = MockFs::new();
    fs.expect_read_file()
        .times(1)
        .returning(|_| Ok(b"{ not json".to_vec()));

    let fakes = FakeServices::new();
    let engine = engine_with_fs(&fakes, Arc::new(fs));
    engine
        .store
        .write()
        .system
        .add_or_update_mod(ModInfo::new(ModId::new(3), "three"), "/game/mods/3");

    load_state(&engine).await.unwrap();
    assert!(engine.store.read().system.is_empty());
}

#[tokio::test]
async fn read_errors_other_than_missing_fail_the_load() {
    let mut fs = MockFs::new();
    fs.expect_read_file()
        .returning(|_| Err(ModError::io("PermissionDenied", "no access")));

    let fakes = FakeServices::new();
    let engine = engine_with_fs(&fakes, Arc::new(fs));

    let err = load_state(&engine).await.unwrap_err();
    assert!(matches!(err, ModError::Io { .. }));
}
