//! Per-folder file information store
//!
//! Each top-level folder owns one YAML file in `.sync/` mapping root-relative
//! paths to the digest and sync timestamp recorded the last time the folder
//! was scanned. The store decides which files to up-sync, and is refreshed
//! after a down-sync from whatever actually arrived on disk.
//!
//! A store that fails validation is never partially trusted: loading it is a
//! fatal error for the whole run.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, SyncError};
use crate::fs_enum::{scan_folder, FileStats};
use crate::hasher::{is_digest, ContentHasher, Digests};
use crate::layout::SyncLayout;
use crate::settings::Settings;

/// What we knew about one file the last time it was synced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRecord {
    /// Content digest; absent when fast mode skipped hashing
    #[serde(default, alias = "sha256", skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Unix seconds of the cycle that last saw this file
    pub sync_ts: i64,
}

/// Decide whether a scanned file must be up-synced.
///
/// A freshly computed digest always wins over timestamps; without one the
/// modification time must be strictly newer than the last sync.
pub fn requires_upload(record: Option<&FileRecord>, digest: Option<&str>, mtime: i64) -> bool {
    match (record, digest) {
        (None, _) => true,
        (Some(record), Some(digest)) => record.digest.as_deref() != Some(digest),
        (Some(record), None) => mtime > record.sync_ts,
    }
}

/// Check that `key` is a clean relative path inside `folder`
fn validate_key(folder: &str, key: &str) -> std::result::Result<(), String> {
    if key.contains('\0') {
        return Err(format!("path {key:?} contains a NUL byte"));
    }

    let mut parts = Vec::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(s) => parts.push(s.to_string_lossy()),
            other => return Err(format!("path {key:?} contains disallowed component {other:?}")),
        }
    }
    // Rebuilding catches `a//b`, `a/./b` and trailing separators
    if parts.join("/") != key {
        return Err(format!("path {key:?} is not normalized"));
    }
    if parts.len() < 2 || parts[0] != folder {
        return Err(format!("path {key:?} is not in the expected folder {folder}"));
    }
    Ok(())
}

/// Parse and validate the serialized store for `folder`
fn parse_records(folder: &str, text: &str) -> std::result::Result<BTreeMap<String, FileRecord>, String> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    match &value {
        serde_yaml::Value::Mapping(_) => {}
        serde_yaml::Value::Null => return Ok(BTreeMap::new()),
        _ => return Err("loaded file info is not a mapping".to_string()),
    }

    let records: BTreeMap<String, FileRecord> =
        serde_yaml::from_value(value).map_err(|e| format!("invalid record: {e}"))?;

    for (key, record) in &records {
        validate_key(folder, key)?;
        if let Some(digest) = &record.digest {
            if !is_digest(digest) {
                return Err(format!("record {key:?} has a malformed digest {digest:?}"));
            }
        }
    }
    Ok(records)
}

/// File information database for a single top-level folder
#[derive(Debug)]
pub struct FolderSyncState {
    folder: String,
    root: PathBuf,
    dot_sync: PathBuf,
    info_path: PathBuf,
    fast_mode: bool,
    records: BTreeMap<String, FileRecord>,
}

impl FolderSyncState {
    /// Load the store for `folder`; a missing info file yields an empty store
    pub fn open(layout: &SyncLayout, settings: &Settings, folder: &str) -> Result<Self> {
        let info_path = layout.info_file(folder);
        let records = match fs::read_to_string(&info_path) {
            Ok(text) => parse_records(folder, &text)
                .map_err(|reason| SyncError::corrupt(&info_path, reason))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(SyncError::corrupt(&info_path, e.to_string())),
        };

        Ok(Self {
            folder: folder.to_string(),
            root: layout.root().to_path_buf(),
            dot_sync: layout.dot_sync_dir(),
            info_path,
            fast_mode: settings.uses_fast_mode(folder),
            records,
        })
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn info_path(&self) -> &Path {
        &self.info_path
    }

    /// Whether this folder skips hashing
    pub fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn records(&self) -> &BTreeMap<String, FileRecord> {
        &self.records
    }

    pub fn record(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Digest `stats` unless this folder is in fast mode
    fn required_digests(
        &self,
        label: &str,
        hasher: &dyn ContentHasher,
        stats: &FileStats,
    ) -> Result<Digests> {
        if self.fast_mode {
            println!("{label}: ! skipping sha calculations for folder {}", self.folder);
            return Ok(Digests::new());
        }
        println!("{label}: ! computing full sha signatures for folder {}", self.folder);
        let paths: Vec<String> = stats.keys().cloned().collect();
        hasher.compute_digests(label, &paths)
    }

    fn upsert(&mut self, path: &str, digest: Option<String>, sync_ts: i64) {
        let record = self
            .records
            .entry(path.to_string())
            .or_insert(FileRecord { digest: None, sync_ts });
        // Clearing the digest in fast mode keeps stale digests from being trusted later
        record.digest = digest;
        record.sync_ts = sync_ts;
    }

    /// Scan the folder, return the paths that must be up-synced, and record
    /// every scanned file as seen at `cycle_start_ts`.
    pub fn compute_upload_set(
        &mut self,
        label: &str,
        hasher: &dyn ContentHasher,
        cycle_start_ts: i64,
    ) -> Result<Vec<String>> {
        let stats = scan_folder(&self.root, &self.folder)?;
        let digests = self.required_digests(label, hasher, &stats)?;

        let upload: Vec<String> = stats
            .iter()
            .filter(|(path, stat)| {
                requires_upload(
                    self.records.get(path.as_str()),
                    digests.get(path.as_str()).map(String::as_str),
                    stat.mtime,
                )
            })
            .map(|(path, _)| path.clone())
            .collect();

        for path in stats.keys() {
            self.upsert(path, digests.get(path).cloned(), cycle_start_ts);
        }

        Ok(upload)
    }

    /// Refresh records for files touched by a down-sync.
    ///
    /// The transfer tool preserves modification times, so access time is what
    /// reveals a file written during this cycle.
    pub fn reconcile_after_download(
        &mut self,
        label: &str,
        hasher: &dyn ContentHasher,
        cycle_start_ts: i64,
        cycle_end_ts: i64,
    ) -> Result<()> {
        let touched: FileStats = scan_folder(&self.root, &self.folder)?
            .into_iter()
            .filter(|(_, stat)| stat.atime >= cycle_start_ts)
            .collect();
        let digests = self.required_digests(label, hasher, &touched)?;

        for path in touched.keys() {
            self.upsert(path, digests.get(path).cloned(), cycle_end_ts);
        }
        Ok(())
    }

    /// Atomically replace the info file with the in-memory store
    pub fn persist(&self) -> Result<()> {
        let persist_err = |source: std::io::Error| SyncError::Persist {
            path: self.info_path.clone(),
            source,
        };

        let yaml = serde_yaml::to_string(&self.records)
            .map_err(|e| persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        fs::create_dir_all(&self.dot_sync).map_err(persist_err)?;
        let mut temp = NamedTempFile::new_in(&self.dot_sync).map_err(persist_err)?;
        temp.write_all(yaml.as_bytes()).map_err(persist_err)?;
        temp.as_file().sync_all().map_err(persist_err)?;
        temp.persist(&self.info_path).map_err(|e| persist_err(e.error))?;
        Ok(())
    }
}
