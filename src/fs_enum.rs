use std::collections::BTreeMap;
use std::path::{Component, Path};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::error::Result;
// Folder enumeration for change detection (Unix focus)

/// Timestamps and size of one scanned file, in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: i64,
    pub atime: i64,
}

/// Root-relative path (`folder/sub/file`) to stats, in path order
pub type FileStats = BTreeMap<String, FileStat>;

/// Dotfiles and dot-directories are never synced
fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Join path components with `/` regardless of platform
fn to_rel_string(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Enumerate every regular file under `root/folder`, skipping dot-prefixed
/// entries at any depth. Keys are relative to `root`.
pub fn scan_folder(root: &Path, folder: &str) -> Result<FileStats> {
    let mut stats = FileStats::new();
    let base = root.join(folder);
    if !base.is_dir() {
        return Ok(stats);
    }

    for entry in WalkDir::new(&base)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        // Skip hidden directories entirely - this prevents walking into them
        .filter_entry(|e| !is_hidden(e.file_name()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // An entry that vanished mid-walk is not worth failing the folder over
                if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) {
                    continue;
                }
                return Err(e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk loop"))
                    .into());
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let rel = match entry.path().strip_prefix(root).ok().and_then(to_rel_string) {
            Some(rel) => rel,
            None => {
                println!("💀  WARNING: not adding file {} (name is not UTF-8)", entry.path().display());
                continue;
            }
        };

        // Symlinks count when they resolve to a regular file
        let metadata = if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(m) => m,
                Err(_) => {
                    println!("💀  WARNING: not adding file {rel} (dangling link)");
                    continue;
                }
            }
        } else {
            entry.metadata().map_err(|e| {
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "stat"))
            })?
        };

        if !metadata.is_file() {
            println!("💀  WARNING: not adding file {rel}");
            continue;
        }

        stats.insert(
            rel,
            FileStat {
                size: metadata.len(),
                mtime: FileTime::from_last_modification_time(&metadata).unix_seconds(),
                atime: FileTime::from_last_access_time(&metadata).unix_seconds(),
            },
        );
    }

    Ok(stats)
}
