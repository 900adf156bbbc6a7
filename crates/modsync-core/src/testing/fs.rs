//! In-memory filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::lock;
use crate::error::{ModError, ModResult};
use crate::ports::FileSystemPort;

/// A filesystem that lives in a pair of maps.
///
/// Free space is a single counter shared by every path.
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    free_space: AtomicU64,
    failing_deletes: Mutex<BTreeSet<PathBuf>>,
    failing_moves: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(BTreeSet::new()),
            free_space: AtomicU64::new(u64::MAX),
            failing_deletes: Mutex::new(BTreeSet::new()),
            failing_moves: Mutex::new(BTreeSet::new()),
        }
    }

    /// Report `bytes` of free space from now on.
    #[must_use]
    pub fn with_free_space(self, bytes: u64) -> Self {
        self.set_free_space(bytes);
        self
    }

    pub fn set_free_space(&self, bytes: u64) {
        self.free_space.store(bytes, Ordering::Relaxed);
    }

    /// Make deleting `path`, file or folder, fail with `PermissionDenied`.
    pub fn fail_deletes_of(&self, path: impl Into<PathBuf>) {
        lock(&self.failing_deletes).insert(path.into());
    }

    /// Make moves onto `path` fail with `PermissionDenied`.
    pub fn fail_moves_to(&self, path: impl Into<PathBuf>) {
        lock(&self.failing_moves).insert(path.into());
    }

    /// Place a file directly, creating its parents.
    pub fn put_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dir_chain(parent);
        }
        lock(&self.files).insert(path, data.into());
    }

    /// Contents of a file, if present.
    pub fn get_file(&self, path: &Path) -> Option<Vec<u8>> {
        lock(&self.files).get(path).cloned()
    }

    /// Every file at or below `dir`, sorted.
    pub fn files_under(&self, dir: &Path) -> Vec<PathBuf> {
        lock(&self.files)
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect()
    }

    fn add_dir_chain(&self, dir: &Path) {
        let mut dirs = lock(&self.dirs);
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    fn not_found(path: &Path) -> ModError {
        ModError::io("NotFound", format!("{} does not exist", path.display()))
    }

    fn denied(path: &Path) -> ModError {
        ModError::io("PermissionDenied", format!("{} is locked", path.display()))
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemPort for MemoryFileSystem {
    async fn file_exists(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path)
    }

    async fn directory_exists(&self, path: &Path) -> bool {
        lock(&self.dirs).contains(path)
    }

    async fn file_size(&self, path: &Path) -> ModResult<u64> {
        lock(&self.files)
            .get(path)
            .map(|d| d.len() as u64)
            .ok_or_else(|| Self::not_found(path))
    }

    async fn create_folder(&self, path: &Path) -> ModResult<()> {
        self.add_dir_chain(path);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> ModResult<()> {
        if lock(&self.failing_deletes).contains(path) {
            return Err(Self::denied(path));
        }
        lock(&self.files)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn delete_folder(&self, path: &Path) -> ModResult<()> {
        if lock(&self.failing_deletes).contains(path) {
            return Err(Self::denied(path));
        }
        let existed = lock(&self.dirs).remove(path);
        if !existed {
            return Err(Self::not_found(path));
        }
        lock(&self.dirs).retain(|d| !d.starts_with(path));
        lock(&self.files).retain(|f, _| !f.starts_with(path));
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> ModResult<Vec<u8>> {
        self.get_file(path).ok_or_else(|| Self::not_found(path))
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> ModResult<()> {
        self.put_file(path, data.to_vec());
        Ok(())
    }

    async fn move_and_overwrite(&self, from: &Path, to: &Path) -> ModResult<()> {
        if lock(&self.failing_moves).contains(to) {
            return Err(Self::denied(to));
        }
        let data = lock(&self.files)
            .remove(from)
            .ok_or_else(|| Self::not_found(from))?;
        self.put_file(to, data);
        Ok(())
    }

    async fn check_space_available(&self, _path: &Path, required: u64) -> ModResult<bool> {
        Ok(self.free_space.load(Ordering::Relaxed) >= required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_folder_is_recursive() {
        let fs = MemoryFileSystem::new();
        fs.put_file("/r/mods/1/a.txt", b"a".to_vec());
        fs.put_file("/r/mods/1/sub/b.txt", b"b".to_vec());
        fs.put_file("/r/mods/2/c.txt", b"c".to_vec());

        fs.delete_folder(Path::new("/r/mods/1")).await.unwrap();
        assert_eq!(fs.files_under(Path::new("/r/mods")).len(), 1);
        assert!(!fs.directory_exists(Path::new("/r/mods/1/sub")).await);

        let err = fs.delete_folder(Path::new("/r/mods/1")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_move_and_overwrite() {
        let fs = MemoryFileSystem::new();
        fs.put_file("/a.tmp", b"new".to_vec());
        fs.put_file("/a", b"old".to_vec());

        fs.move_and_overwrite(Path::new("/a.tmp"), Path::new("/a"))
            .await
            .unwrap();
        assert_eq!(fs.get_file(Path::new("/a")).unwrap(), b"new");
        assert!(!fs.file_exists(Path::new("/a.tmp")).await);
    }
}
