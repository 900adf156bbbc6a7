//! `FileSystemPort` over the local disk.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sysinfo::Disks;
use tokio::fs;

use modsync_core::{FileSystemPort, ModError, ModResult};

fn io_error(err: &io::Error, path: &Path) -> ModError {
    let mapped = ModError::from_io_error(err);
    tracing::debug!(
        target: "modsync::fs",
        path = %path.display(),
        error = %err,
        "Filesystem operation failed"
    );
    mapped
}

/// The local disk, through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub const fn new() -> Self {
        Self
    }
}

async fn ensure_parent(path: &Path) -> ModResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|err| io_error(&err, parent)),
        _ => Ok(()),
    }
}

#[async_trait]
impl FileSystemPort for LocalFileSystem {
    async fn file_exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok_and(|meta| meta.is_file())
    }

    async fn directory_exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok_and(|meta| meta.is_dir())
    }

    async fn file_size(&self, path: &Path) -> ModResult<u64> {
        let meta = fs::metadata(path).await.map_err(|err| io_error(&err, path))?;
        if meta.is_file() {
            Ok(meta.len())
        } else {
            Err(ModError::io(
                "InvalidInput",
                format!("{} is not a file", path.display()),
            ))
        }
    }

    async fn create_folder(&self, path: &Path) -> ModResult<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|err| io_error(&err, path))
    }

    async fn delete_file(&self, path: &Path) -> ModResult<()> {
        fs::remove_file(path)
            .await
            .map_err(|err| io_error(&err, path))
    }

    async fn delete_folder(&self, path: &Path) -> ModResult<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(|err| io_error(&err, path))
    }

    async fn read_file(&self, path: &Path) -> ModResult<Vec<u8>> {
        fs::read(path).await.map_err(|err| io_error(&err, path))
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> ModResult<()> {
        ensure_parent(path).await?;
        fs::write(path, data)
            .await
            .map_err(|err| io_error(&err, path))
    }

    async fn move_and_overwrite(&self, from: &Path, to: &Path) -> ModResult<()> {
        ensure_parent(to).await?;
        if fs::rename(from, to).await.is_ok() {
            return Ok(());
        }
        // Renames across volumes fail; fall back to copy and delete.
        fs::copy(from, to).await.map_err(|err| io_error(&err, to))?;
        fs::remove_file(from)
            .await
            .map_err(|err| io_error(&err, from))
    }

    async fn check_space_available(&self, path: &Path, required: u64) -> ModResult<bool> {
        let path = path.to_path_buf();
        let available = tokio::task::spawn_blocking(move || available_space(&path))
            .await
            .map_err(|err| ModError::io("Other", format!("space query failed: {err}")))?;
        match available {
            Some(available) => {
                tracing::trace!(target: "modsync::fs", required, available, "Free space checked");
                Ok(available >= required)
            }
            // Volumes sysinfo cannot see are not assumed full.
            None => Ok(true),
        }
    }
}

/// Closest existing ancestor of `path`, made absolute.
fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find_map(|candidate| std::fs::canonicalize(candidate).ok())
}

/// Free bytes on the volume that holds `path`, or `None` if no mounted disk
/// contains it.
///
/// Blocks while the disk list refreshes.
pub fn available_space(path: &Path) -> Option<u64> {
    let target = existing_ancestor(path)?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(sysinfo::Disk::available_space)
}
