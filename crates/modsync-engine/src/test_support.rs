//! Engine fixtures for unit tests.

use modsync_core::testing::FakeServices;
use modsync_core::{AuthenticatedUser, ModPaths, UserId};

use crate::context::{Engine, Services};
use crate::session::InitState;

pub const ROOT: &str = "/game";
pub const USER: UserId = UserId::new(42);

/// An initialized engine over in-memory fakes, rooted at [`ROOT`].
pub fn fake_engine() -> (Engine, FakeServices) {
    let fakes = FakeServices::new();
    let engine = Engine::new(Services::new(
        fakes.catalog.clone(),
        fakes.fs.clone(),
        fakes.archiver.clone(),
    ));
    {
        let mut state = engine.store.write();
        state.paths = Some(ModPaths::new(ROOT));
        state.init = InitState::Initialized;
    }
    (engine, fakes)
}

/// Like [`fake_engine`] with a signed-in user and mod management on.
pub fn managed_engine() -> (Engine, FakeServices) {
    let (engine, fakes) = fake_engine();
    {
        let mut state = engine.store.write();
        state.user = Some(AuthenticatedUser::new(USER, "tester", "token"));
        state.management.enabled = true;
    }
    (engine, fakes)
}
