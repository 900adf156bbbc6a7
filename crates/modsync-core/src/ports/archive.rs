//! Archive codec port definition.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::progress::ProgressSink;
use crate::error::ModResult;

/// Packs and unpacks mod archives.
#[async_trait]
pub trait ArchivePort: Send + Sync {
    /// Unpack `archive` into `dest` and return the extracted size in bytes.
    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<u64>;

    /// Pack the contents of `source_dir` into `dest_archive`.
    async fn compress(
        &self,
        source_dir: &Path,
        dest_archive: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<()>;
}
