//! Folder-by-folder sync orchestration
//!
//! Each top-level folder goes through the same cycle, strictly one folder at
//! a time:
//!
//! ```text
//! lock -> scan + up-sync -> down-sync -> reconcile + persist -> unlock
//! ```
//!
//! A failed up-sync ends the cycle without saving state, so the same files are
//! offered again next run. A failed down-sync still reconciles, since some
//! files may have arrived before the tool gave up.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;

use crate::error::{Result, Severity, SyncError};
use crate::hasher::ContentHasher;
use crate::layout::{SyncLayout, DOT_SYNC_FOLDER};
use crate::logger::{Logger, NoopLogger};
use crate::settings::Settings;
use crate::state::FolderSyncState;
use crate::transfer::Transport;

static NOOP_LOGGER: NoopLogger = NoopLogger;

/// Set from the signal handler, polled between steps
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Folder counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    /// True when no folder failed; skipped folders do not count against a run
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FolderOutcome {
    Synced,
    Failed,
    Skipped,
}

/// Exclusive per-folder marker in `.sync/`, removed on drop
struct FolderLock {
    path: std::path::PathBuf,
    label: String,
}

impl FolderLock {
    /// `Ok(None)` when another sync already holds the folder
    fn acquire(layout: &SyncLayout, folder: &str, label: &str) -> Result<Option<Self>> {
        layout.ensure_dot_sync()?;
        let path = layout.lock_file(folder);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let lock = Self {
            path,
            label: label.to_string(),
        };
        // Informational only; the marker's existence is what matters
        let _ = writeln!(
            file,
            "{folder} is being synced by kl-sync (pid {}) since {}",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        Ok(Some(lock))
    }
}

impl Drop for FolderLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => println!("{}: 🔓 unlocked", self.label),
            Err(e) => println!(
                "{}:💀  WARNING: could not remove lock {}: {e}",
                self.label,
                self.path.display()
            ),
        }
    }
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Resolve the folders to sync under `layout.root()`.
///
/// Explicit names are reduced to their base name and created if missing.
/// Without names, every non-hidden directory directly under the root is used.
pub fn discover_folders(layout: &SyncLayout, explicit: Option<&[String]>) -> Result<Vec<String>> {
    let mut folders: Vec<String> = Vec::new();

    match explicit {
        Some(args) => {
            for arg in args {
                let name = Path::new(arg.trim_end_matches('/'))
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| SyncError::InvalidFolder(arg.clone()))?
                    .to_string();
                if name.starts_with('.') || name == DOT_SYNC_FOLDER {
                    return Err(SyncError::InvalidFolder(format!("{arg}: hidden folders are never synced")));
                }

                let dir = layout.folder_dir(&name);
                if dir.exists() && !dir.is_dir() {
                    return Err(SyncError::InvalidFolder(format!("{} is not a directory", dir.display())));
                }
                if !dir.exists() {
                    println!("{name}: △ creating {}", dir.display());
                    fs::create_dir_all(&dir)?;
                }
                if !folders.contains(&name) {
                    folders.push(name);
                }
            }
        }
        None => {
            for entry in fs::read_dir(layout.root())? {
                let entry = entry?;
                // Follows symlinks, so a linked folder is synced like a real one
                if !entry.path().is_dir() {
                    continue;
                }
                match entry.file_name().into_string() {
                    Ok(name) if !name.starts_with('.') => folders.push(name),
                    Ok(_) => {}
                    Err(name) => println!("💀 WARNING: skipping folder with non UTF-8 name {name:?}"),
                }
            }
            folders.sort();
        }
    }

    Ok(folders)
}

/// Runs sync cycles for a set of folders under one root
pub struct Syncer<'a> {
    layout: SyncLayout,
    settings: &'a Settings,
    hasher: &'a dyn ContentHasher,
    transport: &'a dyn Transport,
    logger: &'a dyn Logger,
    interrupt: Interrupt,
}

impl<'a> Syncer<'a> {
    pub fn new(
        layout: SyncLayout,
        settings: &'a Settings,
        hasher: &'a dyn ContentHasher,
        transport: &'a dyn Transport,
    ) -> Self {
        Self {
            layout,
            settings,
            hasher,
            transport,
            logger: &NOOP_LOGGER,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_logger(mut self, logger: &'a dyn Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.is_set() {
            return Err(SyncError::Interrupted);
        }
        Ok(())
    }

    /// A signal also kills the hashing tool; report the signal, not the tool
    fn unless_interrupted<T>(&self, result: Result<T>) -> Result<T> {
        self.check_interrupt()?;
        result
    }

    /// Sync `folders` (or every folder under the root) one after another.
    ///
    /// Folder-level failures are counted and the run continues; fatal errors
    /// and interruption stop the run once the current folder is unlocked.
    pub fn sync_all(&self, folders: Option<&[String]>) -> Result<RunSummary> {
        let started = Instant::now();
        let folders = discover_folders(&self.layout, folders)?;
        let dry_run = self.settings.dry_run();

        if dry_run {
            println!("🌙 DRY RUN: transfers only report what they would do, and no file info is saved");
        }
        self.logger.start(self.layout.root(), &folders, dry_run);

        let width = folders.iter().map(|f| f.chars().count()).max().unwrap_or(0);
        let mut summary = RunSummary::default();

        for folder in &folders {
            self.check_interrupt()?;
            let label = format!("{folder:<width$}");
            self.logger.folder_start(folder);

            match self.sync_folder(folder, &label) {
                Ok(FolderOutcome::Synced) => summary.synced += 1,
                Ok(FolderOutcome::Failed) => summary.failed += 1,
                Ok(FolderOutcome::Skipped) => summary.skipped += 1,
                Err(e) if e.severity() == Severity::Folder => {
                    println!("{label}:💀  ERROR: {e}");
                    self.logger.error(folder, &e.to_string());
                    summary.failed += 1;
                }
                Err(e) => {
                    self.logger.error(folder, &e.to_string());
                    return Err(e);
                }
            }
        }

        self.logger.done(
            summary.synced,
            summary.failed,
            summary.skipped,
            started.elapsed().as_secs_f64(),
        );
        Ok(summary)
    }

    fn sync_folder(&self, folder: &str, label: &str) -> Result<FolderOutcome> {
        let Some(lock) = FolderLock::acquire(&self.layout, folder, label)? else {
            println!(
                "{label}: 🔒 {} exists, another sync is running; skipping",
                self.layout.lock_file(folder).display()
            );
            self.logger.skipped(folder, "locked");
            return Ok(FolderOutcome::Skipped);
        };
        println!("{label}: 🔒 locked");

        let outcome = self.run_cycle(folder, label);
        drop(lock);
        outcome
    }

    fn run_cycle(&self, folder: &str, label: &str) -> Result<FolderOutcome> {
        let cycle_start = now_ts();
        let mut state = FolderSyncState::open(&self.layout, self.settings, folder)?;

        let upload = self.unless_interrupted(state.compute_upload_set(label, self.hasher, cycle_start))?;

        if upload.is_empty() {
            println!("{label}: △ nothing to up-sync");
            self.logger.upload(folder, 0, true);
            if !self.settings.dry_run() {
                self.save(label, &state)?;
            }
        } else {
            println!("{label}: △ up-syncing {} files", upload.len());
            let outcome = self.transport.upload(label, folder, &upload)?;
            self.check_interrupt()?;
            self.logger.upload(folder, upload.len(), outcome.success);
            if !outcome.success {
                println!(
                    "{label}:💀  up-sync failed (exit {}); skipping down-sync, file info not saved",
                    exit_code(outcome.code)
                );
                // Keep the pause so the next folder does not reconnect at once
                thread::sleep(self.settings.cycle_delay());
                return Ok(FolderOutcome::Failed);
            }
            self.save_during_delay(label, &state)?;
        }

        println!("{label}: ▼ down-syncing");
        let outcome = self.transport.download(label, folder)?;
        self.check_interrupt()?;
        self.logger.download(folder, outcome.success);
        if !outcome.success {
            println!(
                "{label}:💀  down-sync failed (exit {}); recording what arrived",
                exit_code(outcome.code)
            );
        }

        self.unless_interrupted(state.reconcile_after_download(
            label,
            self.hasher,
            cycle_start,
            now_ts(),
        ))?;
        self.save_during_delay(label, &state)?;

        if outcome.success {
            println!("{label}: ✅ done");
            Ok(FolderOutcome::Synced)
        } else {
            Ok(FolderOutcome::Failed)
        }
    }

    fn save(&self, label: &str, state: &FolderSyncState) -> Result<()> {
        state.persist()?;
        self.logger.persisted(state.folder(), state.len());
        println!("{label}: ✅ saved info for {} files", state.len());
        Ok(())
    }

    /// Persist while the inter-cycle delay runs, then wait for both
    fn save_during_delay(&self, label: &str, state: &FolderSyncState) -> Result<()> {
        let delay = self.settings.cycle_delay();
        thread::scope(|s| {
            let timer = s.spawn(move || thread::sleep(delay));
            let saved = if self.settings.dry_run() {
                Ok(())
            } else {
                self.save(label, state)
            };
            let _ = timer.join();
            saved
        })
    }
}

fn exit_code(code: Option<i32>) -> String {
    code.map_or_else(|| "by signal".to_string(), |c| c.to_string())
}
