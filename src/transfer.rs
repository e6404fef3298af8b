//! Transfer tool invocation
//!
//! The core never moves bytes itself. [`Transport`] is the seam between the
//! orchestrator and whatever performs the transfer; [`RsyncTransport`] builds
//! rsync command lines from [`Settings`] and relays the tool's output.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use parking_lot::Mutex;

use crate::error::{Result, SyncError};
use crate::relay::run_relayed;
use crate::settings::Settings;

/// Result of one transfer tool run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

impl TransferOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
        }
    }
}

impl From<ExitStatus> for TransferOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Moves files between the sync root and the remote archive
pub trait Transport {
    /// Up-sync `files` (root-relative) into the remote archive
    fn upload(&self, label: &str, folder: &str, files: &[String]) -> Result<TransferOutcome>;

    /// Down-sync the remote copy of `folder` into the sync root
    fn download(&self, label: &str, folder: &str) -> Result<TransferOutcome>;
}

fn common_flags(settings: &Settings, args: &mut Vec<String>) {
    if settings.dry_run() {
        args.push("-n".into());
    }
    if settings.show_progress() {
        args.push("--progress".into());
    }
}

/// Arguments for the up-sync; the file list is read from stdin
pub fn upload_args(settings: &Settings) -> Vec<String> {
    let mut args = Vec::new();
    common_flags(settings, &mut args);
    args.extend(
        [
            "--update",
            "--compress",
            "--times",
            "--perms",
            "--links",
            "--files-from=-",
            ".",
        ]
        .map(String::from),
    );
    args.push(settings.upstream_endpoint().to_string());
    args
}

/// Arguments for the down-sync of `folder`
pub fn download_args(settings: &Settings, folder: &str) -> Vec<String> {
    let mut args = Vec::new();
    common_flags(settings, &mut args);
    if settings.allow_delete() {
        args.push("--delete".into());
    }
    args.extend(
        [
            "--update",
            "--exclude",
            ".*",
            "--compress",
            "--recursive",
            "--times",
            "--perms",
            "--links",
        ]
        .map(String::from),
    );
    args.push(format!(
        "{}/{}",
        settings.upstream_endpoint().trim_end_matches('/'),
        folder
    ));
    args.push(".".into());
    args
}

/// [`Transport`] that shells out to rsync (or a compatible program)
pub struct RsyncTransport<W: Write + Send = io::Stdout> {
    settings: Settings,
    root: PathBuf,
    sink: Mutex<W>,
}

impl RsyncTransport<io::Stdout> {
    pub fn new(settings: &Settings, root: &Path) -> Self {
        Self::with_sink(settings, root, io::stdout())
    }
}

impl<W: Write + Send> RsyncTransport<W> {
    pub fn with_sink(settings: &Settings, root: &Path, sink: W) -> Self {
        Self {
            settings: settings.clone(),
            root: root.to_path_buf(),
            sink: Mutex::new(sink),
        }
    }

    pub fn into_sink(self) -> W {
        self.sink.into_inner()
    }

    fn run(&self, prefix: &str, args: Vec<String>, stdin_lines: Option<&[String]>) -> Result<TransferOutcome> {
        let program = self.settings.transfer_program();
        {
            let mut sink = self.sink.lock();
            writeln!(sink, "{prefix}{program} {}", args.join(" "))?;
        }

        let mut command = Command::new(program);
        command.args(&args).current_dir(&self.root);
        let status = run_relayed(command, stdin_lines, prefix, &self.sink)
            .map_err(|e| SyncError::Transfer(format!("could not run {program}: {e}")))?;
        Ok(status.into())
    }
}

impl<W: Write + Send> Transport for RsyncTransport<W> {
    fn upload(&self, label: &str, _folder: &str, files: &[String]) -> Result<TransferOutcome> {
        let prefix = format!("{label}: △ ");
        self.run(&prefix, upload_args(&self.settings), Some(files))
    }

    fn download(&self, label: &str, folder: &str) -> Result<TransferOutcome> {
        let prefix = format!("{label}: ▼ ");
        self.run(&prefix, download_args(&self.settings, folder), None)
    }
}

/// Copy a single remote file (e.g. the shared settings file) to `dest`
pub fn fetch_file(program: &str, source: &str, dest: &Path) -> Result<TransferOutcome> {
    let mut command = Command::new(program);
    command.args(["--times", "--perms", "--compress"]).arg(source).arg(dest);
    let sink = Mutex::new(io::stdout());
    let status = run_relayed(command, None, "connect: ", &sink)
        .map_err(|e| SyncError::Transfer(format!("could not run {program}: {e}")))?;
    Ok(status.into())
}
