//! Paths of the `.sync` control directory

use std::path::{Path, PathBuf};

/// Name of the control directory under the sync root
pub const DOT_SYNC_FOLDER: &str = ".sync";

/// Settings file name inside [`DOT_SYNC_FOLDER`]
pub const SETTINGS_BASENAME: &str = "sync_settings.txt";

/// Locates everything kl-sync keeps next to the synced folders
#[derive(Debug, Clone)]
pub struct SyncLayout {
    root: PathBuf,
}

impl SyncLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory containing the synced top-level folders
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dot_sync_dir(&self) -> PathBuf {
        self.root.join(DOT_SYNC_FOLDER)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.dot_sync_dir().join(SETTINGS_BASENAME)
    }

    /// Root-relative settings path, as seen on the remote side
    pub fn settings_rel_path() -> String {
        format!("{DOT_SYNC_FOLDER}/{SETTINGS_BASENAME}")
    }

    pub fn info_file(&self, folder: &str) -> PathBuf {
        self.dot_sync_dir().join(format!("{folder}_info.yaml"))
    }

    pub fn lock_file(&self, folder: &str) -> PathBuf {
        self.dot_sync_dir().join(format!("{folder}.lock"))
    }

    pub fn folder_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// Create the control directory if it does not exist yet
    pub fn ensure_dot_sync(&self) -> std::io::Result<bool> {
        let dir = self.dot_sync_dir();
        if dir.is_dir() {
            return Ok(false);
        }
        std::fs::create_dir_all(&dir)?;
        Ok(true)
    }
}
