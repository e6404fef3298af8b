use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use uuid::Uuid;

/// Sync run events; every method defaults to doing nothing
pub trait Logger: Send + Sync {
    fn start(&self, _root: &Path, _folders: &[String], _dry_run: bool) {}
    fn folder_start(&self, _folder: &str) {}
    fn upload(&self, _folder: &str, _files: usize, _success: bool) {}
    fn download(&self, _folder: &str, _success: bool) {}
    fn persisted(&self, _folder: &str, _records: usize) {}
    fn skipped(&self, _folder: &str, _reason: &str) {}
    fn error(&self, _folder: &str, _msg: &str) {}
    fn done(&self, _synced: usize, _failed: usize, _skipped: usize, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Appends one `[timestamp] EVENT run=<id> key=value` line per event
pub struct TextLogger {
    file: Mutex<File>,
    run_id: String,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
            run_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {} run={}", Utc::now().to_rfc3339(), s, self.run_id);
    }
}

impl Logger for TextLogger {
    fn start(&self, root: &Path, folders: &[String], dry_run: bool) {
        self.line(&format!(
            "START root={} folders={} dry_run={}",
            root.display(),
            folders.join(","),
            dry_run
        ));
    }
    fn folder_start(&self, folder: &str) {
        self.line(&format!("FOLDER folder={folder}"));
    }
    fn upload(&self, folder: &str, files: usize, success: bool) {
        self.line(&format!("UPLOAD folder={folder} files={files} ok={success}"));
    }
    fn download(&self, folder: &str, success: bool) {
        self.line(&format!("DOWNLOAD folder={folder} ok={success}"));
    }
    fn persisted(&self, folder: &str, records: usize) {
        self.line(&format!("PERSIST folder={folder} records={records}"));
    }
    fn skipped(&self, folder: &str, reason: &str) {
        self.line(&format!("SKIP folder={folder} reason={reason}"));
    }
    fn error(&self, folder: &str, msg: &str) {
        self.line(&format!("ERROR folder={folder} msg={msg}"));
    }
    fn done(&self, synced: usize, failed: usize, skipped: usize, seconds: f64) {
        self.line(&format!(
            "DONE synced={synced} failed={failed} skipped={skipped} seconds={seconds:.3}"
        ));
    }
}
