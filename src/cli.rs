//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "kl-sync - two-phase rsync folder sync: up-sync changed files, then down-sync the archive"
)]
pub struct Args {
    /// Top-level folders to sync (default: every non-hidden folder under the root)
    pub folders: Vec<String>,

    /// Directory holding the synced folders and the .sync control directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Create .sync/ and a stub settings file, then exit
    #[arg(long, conflicts_with = "connect")]
    pub create: bool,

    /// Fetch the shared settings file from REMOTE (e.g. host:/path/to/archive), then exit
    #[arg(long, value_name = "REMOTE")]
    pub connect: Option<String>,

    /// Append run events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Explicit folder list, or `None` to sync everything under the root
    pub fn folder_list(&self) -> Option<&[String]> {
        if self.folders.is_empty() {
            None
        } else {
            Some(&self.folders)
        }
    }
}
