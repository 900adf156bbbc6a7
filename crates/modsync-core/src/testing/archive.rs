//! Archive codec over [`MemoryFileSystem`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::fs::MemoryFileSystem;
use super::lock;
use crate::error::{ModError, ModResult};
use crate::ports::{ArchivePort, FileSystemPort, ProgressSink};

/// Name of the single file a fake archive extracts to.
pub const EXTRACTED_FILE: &str = "content.bin";

/// Treats an archive's bytes as the payload of one file.
///
/// `compress` serializes a directory tree to JSON, and `extract` of such an
/// archive does not reconstruct it; uploads and installs are tested
/// separately.
pub struct FakeArchiver {
    fs: Arc<MemoryFileSystem>,
    extract_error: Mutex<Option<ModError>>,
    compressed: Mutex<Vec<PathBuf>>,
}

impl FakeArchiver {
    pub fn new(fs: Arc<MemoryFileSystem>) -> Self {
        Self {
            fs,
            extract_error: Mutex::new(None),
            compressed: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next extraction with `error`.
    pub fn fail_next_extract(&self, error: ModError) {
        *lock(&self.extract_error) = Some(error);
    }

    /// Source directories compressed so far.
    pub fn compressed_sources(&self) -> Vec<PathBuf> {
        lock(&self.compressed).clone()
    }
}

#[async_trait]
impl ArchivePort for FakeArchiver {
    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<u64> {
        let injected = lock(&self.extract_error).take();
        if let Some(err) = injected {
            return Err(err);
        }
        let data = self.fs.read_file(archive).await?;
        let size = data.len() as u64;
        progress.set_total(size);
        if progress.is_cancelled() {
            return Err(ModError::Cancelled);
        }
        self.fs.create_folder(dest).await?;
        self.fs.write_file(&dest.join(EXTRACTED_FILE), &data).await?;
        progress.add_progress(size);
        Ok(size)
    }

    async fn compress(
        &self,
        source_dir: &Path,
        dest_archive: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<()> {
        if !self.fs.directory_exists(source_dir).await {
            return Err(ModError::io(
                "NotFound",
                format!("{} does not exist", source_dir.display()),
            ));
        }
        let mut tree = BTreeMap::new();
        for path in self.fs.files_under(source_dir) {
            if progress.is_cancelled() {
                return Err(ModError::Cancelled);
            }
            let data = self.fs.read_file(&path).await?;
            progress.add_progress(data.len() as u64);
            let rel = path
                .strip_prefix(source_dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            tree.insert(rel, data);
        }
        let bytes = serde_json::to_vec(&tree)
            .map_err(|e| ModError::io("InvalidData", e.to_string()))?;
        self.fs.write_file(dest_archive, &bytes).await?;
        lock(&self.compressed).push(source_dir.to_path_buf());
        Ok(())
    }
}
