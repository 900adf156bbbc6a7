//! Exactly-once completion delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use modsync_core::{ModError, ModResult};

type Handler = Box<dyn FnOnce() + Send>;

/// Completion handlers waiting for the host's next `run_pending_handlers`.
#[derive(Default)]
pub struct CompletionQueue {
    handlers: Mutex<VecDeque<Handler>>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, handler: Handler) {
        self.lock().push_back(handler);
    }

    /// Run every queued handler, outside the queue lock.
    ///
    /// Handlers queued while draining run on the next call.
    pub fn drain(&self) -> usize {
        let handlers = std::mem::take(&mut *self.lock());
        let count = handlers.len();
        for handler in handlers {
            handler();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// A host callback that fires exactly once.
///
/// `complete` queues the callback with a result. Dropping an uncompleted
/// `Completion` (a task torn down by shutdown, for example) queues it with
/// [`ModError::Cancelled`].
pub struct Completion<T: Send + 'static> {
    callback: Option<Box<dyn FnOnce(ModResult<T>) + Send>>,
    queue: Arc<CompletionQueue>,
}

impl<T: Send + 'static> Completion<T> {
    pub fn new(
        queue: &Arc<CompletionQueue>,
        callback: impl FnOnce(ModResult<T>) + Send + 'static,
    ) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            queue: Arc::clone(queue),
        }
    }

    pub fn complete(mut self, result: ModResult<T>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: ModResult<T>) {
        if let Some(callback) = self.callback.take() {
            self.queue.push(Box::new(move || callback(result)));
        }
    }
}

impl<T: Send + 'static> Drop for Completion<T> {
    fn drop(&mut self) {
        self.deliver(Err(ModError::Cancelled));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_completion_fires_once() {
        let queue = Arc::new(CompletionQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let completion = Completion::new(&queue, move |r: ModResult<u32>| {
            assert_eq!(r.unwrap(), 7);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        completion.complete(Ok(7));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.drain(), 1);
        assert_eq!(queue.drain(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_completion_reports_cancelled() {
        let queue = Arc::new(CompletionQueue::new());
        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);

        drop(Completion::new(&queue, move |r: ModResult<()>| {
            *slot.lock().unwrap() = Some(r);
        }));
        queue.drain();

        assert_eq!(*result.lock().unwrap(), Some(Err(ModError::Cancelled)));
    }
}
