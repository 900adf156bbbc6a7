//! Shared fixtures for the engine scenario tests.

#![allow(dead_code)]

use std::sync::Arc;

use modsync_core::testing::FakeServices;
use modsync_core::{AuthenticatedUser, FileSystemPort, ModId, ModPaths, UserId};
use modsync_engine::session::{CollectionKind, InitState};
use modsync_engine::{Engine, Services};

pub const ROOT: &str = "/game";
pub const USER: UserId = UserId::new(7);

/// An initialized engine with a signed-in user and mod management on.
pub fn engine_with_fs(fakes: &FakeServices, fs: Arc<dyn FileSystemPort>) -> Engine {
    let engine = Engine::new(Services::new(fakes.catalog.clone(), fs, fakes.archiver.clone()));
    {
        let mut state = engine.store.write();
        state.paths = Some(ModPaths::new(ROOT));
        state.init = InitState::Initialized;
        state.user = Some(AuthenticatedUser::new(USER, "player", "token"));
        state.management.enabled = true;
    }
    engine
}

pub fn engine() -> (Engine, FakeServices) {
    let fakes = FakeServices::new();
    let engine = engine_with_fs(&fakes, fakes.fs.clone());
    (engine, fakes)
}

/// Publish `id` in the fake catalog and subscribe the user to it locally.
pub fn subscribed(engine: &Engine, fakes: &FakeServices, id: i64, payload: &[u8]) -> ModId {
    let info = fakes.catalog.add_mod(id, payload.to_vec());
    let mut state = engine.store.write();
    let path = state
        .install_path(CollectionKind::System, info.id)
        .expect("paths are set");
    state.subscriptions.add(info.id);
    state
        .system
        .add_or_update_mod(info.clone(), path)
        .add_local_subscription(USER);
    info.id
}
