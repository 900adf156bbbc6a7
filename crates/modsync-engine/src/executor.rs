//! The single executor all engine work runs on.
//!
//! Host threads never touch session state directly. They push tasks onto a
//! [`TaskQueue`]; a dispatcher on the executor receives them and runs each
//! as its own task, so pipelines and the management loop interleave only at
//! await points.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::Engine;
use crate::error::EngineError;

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Work submitted from a host thread.
pub type Task = Box<dyn FnOnce(Arc<Engine>) -> TaskFuture + Send>;

const THREAD_NAME: &str = "modsync-executor";

/// Owner of the runtime engine work is spawned on.
pub struct Executor {
    handle: Handle,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl Executor {
    /// Start a dedicated thread running a current-thread runtime.
    pub fn spawn_dedicated() -> Result<Self, EngineError> {
        let shutdown = CancellationToken::new();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let stop = shutdown.clone();

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(stop.cancelled());
                tracing::debug!(target: "modsync::executor", "Executor thread stopping");
            })
            .map_err(EngineError::SpawnThread)?;

        let handle = ready_rx
            .recv()
            .map_err(|_| EngineError::ExecutorStopped)?
            .map_err(EngineError::BuildRuntime)?;
        tracing::debug!(target: "modsync::executor", "Executor thread started");
        Ok(Self {
            handle,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Run on an existing runtime, typically the test's.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            shutdown: CancellationToken::new(),
            thread: None,
        }
    }

    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.handle.spawn(future));
    }

    /// Start a dispatcher feeding `engine` the tasks pushed on the returned
    /// queue until `token` is cancelled.
    ///
    /// Tasks still running or queued when `token` fires are dropped, which
    /// completes their callbacks with `Cancelled`.
    pub fn start_dispatcher(&self, engine: Arc<Engine>, token: CancellationToken) -> TaskQueue {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.spawn(dispatch(engine, receiver, token));
        TaskQueue { sender }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != std::thread::current().id() && thread.join().is_err() {
                tracing::error!(target: "modsync::executor", "Executor thread panicked");
            }
        }
    }
}

async fn dispatch(
    engine: Arc<Engine>,
    mut receiver: mpsc::UnboundedReceiver<Task>,
    token: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            () = token.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };
        let future = task(Arc::clone(&engine));
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = future => {}
            }
        });
    }
    receiver.close();
    tracing::debug!(target: "modsync::executor", "Task dispatcher stopped");
}

/// Sending side of the task queue; cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    /// Queue `task`. Returns `false` if the dispatcher has stopped, in which
    /// case the task is dropped unrun.
    pub fn push(&self, task: Task) -> bool {
        self.sender.send(task).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Completion;
    use crate::test_support::fake_engine;
    use modsync_core::ModError;
    use std::sync::Mutex;

    fn boxed<F>(f: F) -> Task
    where
        F: FnOnce(Arc<Engine>) -> TaskFuture + Send + 'static,
    {
        Box::new(f)
    }

    #[tokio::test]
    async fn test_dispatcher_runs_tasks_in_order() {
        let (engine, _fakes) = fake_engine();
        let engine = Arc::new(engine);
        let executor = Executor::from_handle(Handle::current());
        let queue = executor.start_dispatcher(Arc::clone(&engine), CancellationToken::new());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        for n in 0..3 {
            let seen = Arc::clone(&seen);
            assert!(queue.push(boxed(move |_| {
                Box::pin(async move { seen.lock().unwrap().push(n) })
            })));
        }
        assert!(queue.push(boxed(move |_| {
            Box::pin(async move {
                let _ = done_tx.send(());
            })
        })));
        done_rx.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_cancelled_dispatcher_cancels_pending_work() {
        let (engine, _fakes) = fake_engine();
        let engine = Arc::new(engine);
        let executor = Executor::from_handle(Handle::current());
        let token = CancellationToken::new();
        let queue = executor.start_dispatcher(Arc::clone(&engine), token.clone());

        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let completion = Completion::new(engine.store.completions(), move |r: Result<(), _>| {
            sink.lock().unwrap().push(r);
        });
        assert!(queue.push(boxed(move |_| {
            Box::pin(async move {
                std::future::pending::<()>().await;
                completion.complete(Ok(()));
            })
        })));
        tokio::task::yield_now().await;
        token.cancel();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        engine.store.completions().drain();
        assert_eq!(*results.lock().unwrap(), vec![Err(ModError::Cancelled)]);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_dedicated_thread_runs_spawned_work() {
        let executor = Executor::spawn_dedicated().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        executor.spawn(async move {
            let _ = tx.send(std::thread::current().name().map(str::to_owned));
        });
        let name = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some(THREAD_NAME));
    }
}
