//! On-disk layout of a session.
//!
//! ```text
//! <root>/
//!   metadata/state.json
//!   mods/<id>/
//!   temp_mods/<id>/
//!   downloads/<id>_<filename>
//!   uploads/<id>.zip
//! <user dir>/user.json            (default <root>/user)
//! ```

use std::path::{Path, PathBuf};

use crate::config::SessionOptions;
use crate::domain::ModId;
use crate::error::{ModError, ModResult};

const STATE_FILE: &str = "state.json";
const USER_FILE: &str = "user.json";

/// Every location the engine reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModPaths {
    root: PathBuf,
    user_dir: PathBuf,
}

impl ModPaths {
    /// Paths rooted at `root` with the default user directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let user_dir = root.join("user");
        Self { root, user_dir }
    }

    /// Resolve the layout for `options`.
    pub fn from_options(options: &SessionOptions) -> ModResult<Self> {
        let root = match &options.root_directory {
            Some(root) => root.clone(),
            None => dirs::data_local_dir()
                .ok_or_else(|| ModError::io("NotFound", "no local data directory"))?
                .join("modsync")
                .join(options.game_id.to_string()),
        };
        let mut paths = Self::new(root);
        if let Some(user_dir) = &options.user_data_directory {
            paths.user_dir.clone_from(user_dir);
        }
        Ok(paths)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn state_file(&self) -> PathBuf {
        self.metadata_dir().join(STATE_FILE)
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn user_data_file(&self) -> PathBuf {
        self.user_dir.join(USER_FILE)
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.root.join("mods")
    }

    pub fn temp_mods_dir(&self) -> PathBuf {
        self.root.join("temp_mods")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// Install folder of a mod.
    pub fn mod_install_path(&self, id: ModId) -> PathBuf {
        self.mods_dir().join(id.to_string())
    }

    /// Install folder of a temporary mod.
    pub fn temp_mod_install_path(&self, id: ModId) -> PathBuf {
        self.temp_mods_dir().join(id.to_string())
    }

    /// Staging file for a download.
    pub fn download_path(&self, id: ModId, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map_or_else(|| "modfile.zip".into(), |n| n.to_string_lossy());
        self.downloads_dir().join(format!("{id}_{name}"))
    }

    /// Staging archive for an upload.
    pub fn upload_archive_path(&self, id: ModId) -> PathBuf {
        self.uploads_dir().join(format!("{id}.zip"))
    }

    /// Folders created at initialization.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.metadata_dir(),
            self.mods_dir(),
            self.temp_mods_dir(),
            self.downloads_dir(),
            self.uploads_dir(),
            self.user_dir.clone(),
        ]
    }
}

/// Sibling temp file used for atomic writes of `path`.
pub fn temp_file_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
