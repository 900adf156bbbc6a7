//! In-memory fakes of every port.
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for downstream crates' tests.

mod archive;
mod catalog;
mod fs;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use archive::{EXTRACTED_FILE, FakeArchiver};
pub use catalog::{FakeCall, FakeCatalog};
pub use fs::MemoryFileSystem;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A filesystem, catalog and archiver wired together.
pub struct FakeServices {
    pub fs: Arc<MemoryFileSystem>,
    pub catalog: Arc<FakeCatalog>,
    pub archiver: Arc<FakeArchiver>,
}

impl FakeServices {
    pub fn new() -> Self {
        let fs = Arc::new(MemoryFileSystem::new());
        Self {
            catalog: Arc::new(FakeCatalog::new(Arc::clone(&fs))),
            archiver: Arc::new(FakeArchiver::new(Arc::clone(&fs))),
            fs,
        }
    }
}

impl Default for FakeServices {
    fn default() -> Self {
        Self::new()
    }
}
