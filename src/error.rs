//! Error taxonomy for sync runs
//!
//! Every error carries a [`Severity`] so the orchestrator can decide whether a
//! failure stays local to one folder or must abort the whole run.

use std::path::PathBuf;

use thiserror::Error;

use crate::settings::SettingsError;

/// How far an error is allowed to propagate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Shared state is untrustworthy; abort the run
    Fatal,
    /// Only the current folder is affected; continue with the next one
    Folder,
    /// A termination signal was received; release locks and exit
    Interrupted,
}

/// Errors raised while syncing folders
#[derive(Debug, Error)]
pub enum SyncError {
    /// Settings could not be loaded or are not acknowledged
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// A folder's info file failed validation
    #[error("could not load file info from {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// The hashing tool is missing or produced output we cannot parse
    #[error("hashing tool does not work as expected: {0}")]
    HashTool(String),

    /// The folder's info file could not be written
    #[error("could not save file info to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A folder named on the command line cannot be synced
    #[error("invalid sync folder: {0}")]
    InvalidFolder(String),

    /// Transfer tool could not be run
    #[error("transfer tool failed: {0}")]
    Transfer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A termination signal arrived while a folder was being synced
    #[error("interrupted by signal")]
    Interrupted,
}

impl SyncError {
    pub fn severity(&self) -> Severity {
        match self {
            SyncError::Settings(_)
            | SyncError::CorruptState { .. }
            | SyncError::HashTool(_)
            | SyncError::Persist { .. }
            | SyncError::InvalidFolder(_) => Severity::Fatal,
            SyncError::Transfer(_) | SyncError::Io(_) => Severity::Folder,
            SyncError::Interrupted => Severity::Interrupted,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SyncError::CorruptState {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
