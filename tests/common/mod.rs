#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use kl_sync::error::Result;
use kl_sync::hasher::{ContentHasher, Digests};
use kl_sync::layout::SyncLayout;
use kl_sync::settings::{Settings, SettingsFile};
use kl_sync::transfer::{TransferOutcome, Transport};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use walkdir::WalkDir;

/// A local sync root and a directory standing in for the remote archive
pub struct Fixture {
    _temp: TempDir,
    pub root: PathBuf,
    pub remote: PathBuf,
    pub layout: SyncLayout,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("local");
        let remote = temp.path().join("remote");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&remote).unwrap();
        let layout = SyncLayout::new(&root);
        layout.ensure_dot_sync().unwrap();
        Self {
            _temp: temp,
            root,
            remote,
            layout,
        }
    }

    pub fn write_local(&self, rel: &str, contents: &str) -> PathBuf {
        write_file(&self.root, rel, contents)
    }

    pub fn write_remote(&self, rel: &str, contents: &str) -> PathBuf {
        write_file(&self.remote, rel, contents)
    }

    pub fn settings(&self) -> Settings {
        SettingsFile {
            upstream_folder: Some(self.remote.to_string_lossy().into_owned()),
            sleep_time: 0,
            rsync_dry_run: false,
            settings_are_set: true,
            ..Default::default()
        }
        .validate(Path::new("test"))
        .unwrap()
    }

    pub fn transport(&self) -> DirTransport {
        DirTransport::new(&self.root, &self.remote)
    }

    pub fn hasher(&self) -> Sha2Hasher {
        Sha2Hasher::new(&self.root)
    }
}

fn write_file(base: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = base.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

/// In-process digests, truncated to the 40 hex chars the hashing tool emits
pub struct Sha2Hasher {
    root: PathBuf,
    pub hashed: Cell<usize>,
}

impl Sha2Hasher {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            hashed: Cell::new(0),
        }
    }
}

impl ContentHasher for Sha2Hasher {
    fn compute_digests(&self, _label: &str, paths: &[String]) -> Result<Digests> {
        self.hashed.set(self.hashed.get() + paths.len());
        let mut out = Digests::new();
        for path in paths {
            let bytes = fs::read(self.root.join(path))?;
            let hex: String = Sha256::digest(&bytes)
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect();
            out.insert(path.clone(), hex[..40].to_string());
        }
        Ok(out)
    }
}

/// Copies between two local directories the way `rsync --update --times` would:
/// newer-or-missing files are written, modification times are preserved, and
/// written files get a fresh access time.
pub struct DirTransport {
    root: PathBuf,
    remote: PathBuf,
    pub fail_upload: Cell<bool>,
    pub fail_download: Cell<bool>,
    pub uploads: RefCell<Vec<Vec<String>>>,
    pub downloads: RefCell<Vec<String>>,
}

impl DirTransport {
    pub fn new(root: &Path, remote: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            remote: remote.to_path_buf(),
            fail_upload: Cell::new(false),
            fail_download: Cell::new(false),
            uploads: RefCell::new(Vec::new()),
            downloads: RefCell::new(Vec::new()),
        }
    }

    fn copy_if_newer(src: &Path, dest: &Path) {
        let src_meta = fs::metadata(src).unwrap();
        let src_mtime = FileTime::from_last_modification_time(&src_meta);
        if let Ok(dest_meta) = fs::metadata(dest) {
            if FileTime::from_last_modification_time(&dest_meta) >= src_mtime {
                return;
            }
        }
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::copy(src, dest).unwrap();
        let now = FileTime::from_system_time(SystemTime::now());
        filetime::set_file_times(dest, now, src_mtime).unwrap();
    }
}

impl Transport for DirTransport {
    fn upload(&self, _label: &str, _folder: &str, files: &[String]) -> Result<TransferOutcome> {
        self.uploads.borrow_mut().push(files.to_vec());
        if self.fail_upload.get() {
            return Ok(TransferOutcome::failed(23));
        }
        for rel in files {
            Self::copy_if_newer(&self.root.join(rel), &self.remote.join(rel));
        }
        Ok(TransferOutcome::succeeded())
    }

    fn download(&self, _label: &str, folder: &str) -> Result<TransferOutcome> {
        self.downloads.borrow_mut().push(folder.to_string());
        let base = self.remote.join(folder);
        if base.is_dir() {
            let walker = WalkDir::new(&base)
                .into_iter()
                .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));
            for entry in walker {
                let entry = entry.unwrap();
                if entry.file_type().is_file() {
                    let rel = entry.path().strip_prefix(&self.remote).unwrap();
                    Self::copy_if_newer(entry.path(), &self.root.join(rel));
                }
            }
        }
        // A failing down-sync may still have written some files
        if self.fail_download.get() {
            return Ok(TransferOutcome::failed(12));
        }
        Ok(TransferOutcome::succeeded())
    }
}

/// Read back the persisted records for `folder` as a plain YAML mapping
pub fn stored_records(layout: &SyncLayout, folder: &str) -> serde_yaml::Mapping {
    let text = fs::read_to_string(layout.info_file(folder)).unwrap();
    serde_yaml::from_str(&text).unwrap_or_default()
}
