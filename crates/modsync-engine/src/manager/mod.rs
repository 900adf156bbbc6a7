//! Host-facing facade over the engine.
//!
//! # Threading
//!
//! - Every method may be called from any host thread.
//! - Asynchronous operations validate their preconditions on the calling
//!   thread, then queue a task for the executor. Their callbacks, the mod
//!   management callback and the log callback only ever run inside
//!   [`ModManager::run_pending_handlers`], on the thread that calls it.
//! - Queries take the shutdown lock shared and read one consistent snapshot.

mod operations;
mod queries;
mod temp_set;

pub use queries::EntryMap;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use modsync_core::{
    ModError, ModManagementEvent, ModPaths, ModResult, SessionOptions, validate_options,
};
use tokio_util::sync::CancellationToken;

use crate::context::{Engine, Services};
use crate::error::EngineError;
use crate::executor::{Executor, Task, TaskQueue};
use crate::logging::{LogBuffer, LogLine};
use crate::ops::storage::{load_state, load_user_data};
use crate::ops::{Completion, Precheck, validate_installed_mods};
use crate::scheduler::{run_management_loop, select_next_action};
use crate::session::{InitState, ManagementState, SessionState};

/// Callback receiving captured log lines.
pub type LogCallback = Arc<dyn Fn(&LogLine) + Send + Sync>;

/// The mod lifecycle engine as seen by a host application.
pub struct ModManager {
    engine: Arc<Engine>,
    executor: Executor,
    tasks: Mutex<Option<TaskQueue>>,
    log_buffer: Option<Arc<LogBuffer>>,
    log_callback: Mutex<Option<LogCallback>>,
    /// Whether the host has an open temporary mod set, ahead of the queued
    /// task that opens or closes it.
    temp_set_requested: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ModManager {
    /// Create a manager running its work on a dedicated executor thread.
    pub fn new(services: Services) -> Result<Self, EngineError> {
        Ok(Self::with_executor(services, Executor::spawn_dedicated()?))
    }

    pub fn with_executor(services: Services, executor: Executor) -> Self {
        Self {
            engine: Arc::new(Engine::new(services)),
            executor,
            tasks: Mutex::new(None),
            log_buffer: None,
            log_callback: Mutex::new(None),
            temp_set_requested: AtomicBool::new(false),
        }
    }

    /// Deliver lines captured by a [`crate::logging::HostLogLayer`] sharing
    /// `buffer` to the log callback.
    #[must_use]
    pub fn with_log_buffer(mut self, buffer: Arc<LogBuffer>) -> Self {
        self.log_buffer = Some(buffer);
        self
    }

    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start a session.
    ///
    /// Creates the storage folders, loads the persisted collection and user
    /// data, and queues reinstalls of installed mods missing from disk.
    pub fn initialize_async(
        &self,
        options: SessionOptions,
        callback: impl FnOnce(ModResult<()>) + Send + 'static,
    ) {
        let completion = Completion::new(self.engine.store.completions(), callback);
        let paths = match validate_options(&options).and_then(|()| ModPaths::from_options(&options))
        {
            Ok(paths) => paths,
            Err(err) => return completion.complete(Err(err)),
        };
        let log_level = options.log_level;
        if !self.engine.store.begin_initialize(options) {
            return completion.complete(Err(ModError::AlreadyInitialized));
        }
        if let Some(buffer) = &self.log_buffer {
            buffer.set_level(log_level);
        }

        let token = {
            let mut state = self.engine.store.write();
            state.paths = Some(paths);
            state.session_token.clone()
        };
        *lock(&self.tasks) = Some(
            self.executor
                .start_dispatcher(Arc::clone(&self.engine), token.clone()),
        );

        let engine = Arc::clone(&self.engine);
        self.executor.spawn(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(ModError::Cancelled),
                result = initialize(&engine, &token) => result,
            };
            if let Err(err) = &result {
                tracing::error!(target: "modsync::engine", error = %err, "Initialization failed");
                if !token.is_cancelled() {
                    engine.store.reset();
                }
            }
            completion.complete(result);
        });
    }

    /// End the session.
    ///
    /// Mod management stops, in-flight operations complete with `Cancelled`
    /// on the next [`Self::run_pending_handlers`], and all session state is
    /// dropped. The manager can be initialized again afterwards.
    pub fn shutdown(&self) {
        self.disable_mod_management();
        self.engine.store.reset();
        *lock(&self.tasks) = None;
        self.temp_set_requested.store(false, Ordering::SeqCst);
        tracing::info!(target: "modsync::engine", "Session shut down");
    }

    /// Run queued callbacks on the calling thread: operation completions,
    /// then mod management events, then captured log lines.
    pub fn run_pending_handlers(&self) {
        self.engine.store.completions().drain();

        let (events, callback) = {
            let mut state = self.engine.store.write();
            (state.events.clear_log(), state.management.callback.clone())
        };
        if let Some(callback) = callback {
            for event in events {
                callback(event);
            }
        }

        if let Some(buffer) = &self.log_buffer {
            let lines = buffer.drain();
            let callback = lock(&self.log_callback).clone();
            if let Some(callback) = callback {
                for line in &lines {
                    callback(line);
                }
            }
        }
    }

    pub fn set_log_callback(&self, callback: impl Fn(&LogLine) + Send + Sync + 'static) {
        *lock(&self.log_callback) = Some(Arc::new(callback));
    }

    pub fn set_log_level(&self, level: modsync_core::LogLevel) {
        if let Some(buffer) = &self.log_buffer {
            buffer.set_level(level);
        }
        self.engine.store.write().options.log_level = level;
    }

    // =========================================================================
    // Mod management
    // =========================================================================

    /// Start installing, updating and uninstalling mods in the background.
    ///
    /// `callback` receives every [`ModManagementEvent`] from then on.
    pub fn enable_mod_management(
        &self,
        callback: impl Fn(ModManagementEvent) + Send + Sync + 'static,
    ) -> ModResult<()> {
        let token = {
            let mut state = self.engine.store.write();
            Precheck::new(&state).initialized()?.management_disabled()?;
            let token = state.session_token.child_token();
            state.management = ManagementState {
                enabled: true,
                token: token.clone(),
                callback: Some(Arc::new(callback)),
            };
            token
        };
        self.executor
            .spawn(run_management_loop(Arc::clone(&self.engine), token));
        tracing::info!(target: "modsync::engine", "Mod management enabled");
        Ok(())
    }

    /// Stop background processing, cancelling the current transfer.
    ///
    /// Events already logged are still delivered.
    pub fn disable_mod_management(&self) {
        {
            let mut state = self.engine.store.write();
            if !state.management.enabled {
                return;
            }
            state.management.enabled = false;
            state.management.token.cancel();
        }
        self.engine.store.progress().cancel(None);
        tracing::info!(target: "modsync::engine", "Mod management disabled");
    }

    /// Whether a transfer is running or the loop has work queued.
    pub fn is_mod_management_busy(&self) -> bool {
        self.engine.store.query(|state| {
            self.engine.store.progress().current().is_some()
                || (state.management.enabled
                    && select_next_action(state, std::time::Instant::now()).is_some())
        })
    }

    // =========================================================================
    // Task plumbing
    // =========================================================================

    fn push(&self, task: Task) -> bool {
        lock(&self.tasks).as_ref().is_some_and(|queue| queue.push(task))
    }

    /// Check `precheck` now, then run `op` on the executor and complete
    /// `callback` with its result.
    ///
    /// A failed precheck completes the callback without queueing anything.
    fn submit<T, F, Fut>(
        &self,
        callback: impl FnOnce(ModResult<T>) + Send + 'static,
        precheck: impl FnOnce(&SessionState) -> ModResult<()>,
        op: F,
    ) where
        T: Send + 'static,
        F: FnOnce(Arc<Engine>) -> Fut + Send + 'static,
        Fut: Future<Output = ModResult<T>> + Send + 'static,
    {
        let completion = Completion::new(self.engine.store.completions(), callback);
        if let Err(err) = self.engine.store.query(precheck) {
            return completion.complete(Err(err));
        }
        // A task the dispatcher never runs drops its completion, which
        // reports `Cancelled`.
        self.push(Box::new(move |engine| {
            Box::pin(async move { completion.complete(op(engine).await) })
        }));
    }

    /// Queue a state change with no caller waiting on it.
    fn push_mutation<F, Fut>(&self, op: F) -> ModResult<()>
    where
        F: FnOnce(Arc<Engine>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.push(Box::new(move |engine| Box::pin(op(engine)))) {
            Ok(())
        } else {
            Err(ModError::NotInitialized)
        }
    }
}

impl Drop for ModManager {
    fn drop(&mut self) {
        if self.engine.store.read().init != InitState::NotInitialized {
            self.shutdown();
        }
    }
}

async fn initialize(engine: &Engine, token: &CancellationToken) -> ModResult<()> {
    let paths = engine.paths()?;
    for dir in paths.required_dirs() {
        engine.fs().create_folder(&dir).await?;
    }
    load_state(engine).await?;
    load_user_data(engine).await?;
    let reinstalls = validate_installed_mods(engine).await;

    let mut state = engine.store.write();
    // A shutdown during loading has already replaced the state.
    if token.is_cancelled() {
        return Err(ModError::Cancelled);
    }
    state.init = InitState::Initialized;
    tracing::info!(
        target: "modsync::engine",
        root = %paths.root().display(),
        mods = state.system.len(),
        subscriptions = state.subscriptions.len(),
        reinstalls = reinstalls.len(),
        "Session initialized"
    );
    Ok(())
}
