//! Filesystem port definition.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ModResult;

/// Filesystem primitives the engine needs.
///
/// Paths are absolute; path construction lives in [`ModPaths`].
///
/// [`ModPaths`]: crate::paths::ModPaths
#[async_trait]
pub trait FileSystemPort: Send + Sync {
    async fn file_exists(&self, path: &Path) -> bool;

    async fn directory_exists(&self, path: &Path) -> bool;

    /// Size of a regular file in bytes.
    async fn file_size(&self, path: &Path) -> ModResult<u64>;

    /// Create a directory and any missing parents.
    async fn create_folder(&self, path: &Path) -> ModResult<()>;

    async fn delete_file(&self, path: &Path) -> ModResult<()>;

    /// Delete a directory recursively.
    ///
    /// A missing directory is reported as an `Io` error of kind `NotFound`.
    async fn delete_folder(&self, path: &Path) -> ModResult<()>;

    async fn read_file(&self, path: &Path) -> ModResult<Vec<u8>>;

    /// Write `data`, replacing any existing file and creating parents.
    async fn write_file(&self, path: &Path, data: &[u8]) -> ModResult<()>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    async fn move_and_overwrite(&self, from: &Path, to: &Path) -> ModResult<()>;

    /// Whether the volume holding `path` has `required` free bytes.
    async fn check_space_available(&self, path: &Path, required: u64) -> ModResult<bool>;
}
