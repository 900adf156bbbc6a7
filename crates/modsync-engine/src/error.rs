//! Errors raised while standing up the engine itself.
//!
//! Mod operations report [`modsync_core::ModError`] through their
//! completions; these only come out of constructors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn the executor thread: {0}")]
    SpawnThread(#[source] std::io::Error),

    #[error("failed to build the executor runtime: {0}")]
    BuildRuntime(#[source] std::io::Error),

    #[error("executor thread exited before it was ready")]
    ExecutorStopped,
}
