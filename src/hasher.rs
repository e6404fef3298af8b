//! Content digests via an external hashing tool
//!
//! The tool (`shasum -b` by default) is run once per batch of paths so the
//! argument list stays well below command-line length limits. Its output is
//! parsed strictly: a line we do not understand means the tool is broken or
//! mis-installed, and the whole run stops.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Result, SyncError};
use crate::progress::HashProgress;

/// Paths handed to the hashing tool per invocation
pub const BATCH_SIZE: usize = 100;

/// Length of a hex-encoded SHA-1 digest
pub const DIGEST_LEN: usize = 40;

/// Root-relative path to lowercase hex digest
pub type Digests = BTreeMap<String, String>;

/// Computes content digests for root-relative paths
pub trait ContentHasher {
    /// Digest every path in `paths`. `label` prefixes progress output.
    fn compute_digests(&self, label: &str, paths: &[String]) -> Result<Digests>;
}

/// Check that `s` looks like a digest the hashing tool would produce
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse `<40-hex> *<path>` lines into a digest map
pub fn parse_digest_lines(output: &str) -> Result<Digests> {
    let mut digests = Digests::new();
    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        let bytes = line.as_bytes();
        let well_formed = bytes.len() > DIGEST_LEN + 2
            && bytes[..DIGEST_LEN].iter().all(|b| b.is_ascii_hexdigit())
            && bytes[DIGEST_LEN + 1] == b'*';
        if !well_formed {
            return Err(SyncError::HashTool(format!("unexpected output line {line:?}")));
        }
        let digest = line[..DIGEST_LEN].to_ascii_lowercase();
        let path = &line[DIGEST_LEN + 2..];
        digests.insert(path.to_string(), digest);
    }
    Ok(digests)
}

/// [`ContentHasher`] backed by `shasum -b` or a compatible program
#[derive(Debug, Clone)]
pub struct ShasumHasher {
    root: PathBuf,
    program: String,
    args: Vec<String>,
    batch_size: usize,
}

impl ShasumHasher {
    /// `command` is the program followed by its fixed arguments
    pub fn new(root: &Path, command: &[String]) -> Self {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => ("shasum".to_string(), vec!["-b".to_string()]),
        };
        Self {
            root: root.to_path_buf(),
            program,
            args,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Digest one batch. Paths the tool skipped must have vanished from disk;
    /// a skipped path that still exists means the tool itself is failing.
    fn run_batch(&self, label: &str, batch: &[String]) -> Result<Digests> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--")
            .args(batch)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SyncError::HashTool(format!("could not run {}: {e}", self.program)))?;

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| SyncError::HashTool(format!("{} produced non UTF-8 output", self.program)))?;
        let digests = parse_digest_lines(&stdout)?;
        if output.status.success() {
            return Ok(digests);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        for path in batch.iter().filter(|p| !digests.contains_key(p.as_str())) {
            if self.root.join(path).symlink_metadata().is_ok() {
                return Err(SyncError::HashTool(format!(
                    "{} exited with {} without a digest for {path}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                )));
            }
        }

        // Only files that vanished between scan and hash are missing
        println!(
            "{label}:💀  WARNING: {} exited with {}; digests of vanished files are missing",
            self.program, output.status
        );
        for line in stderr.lines() {
            println!("{label}:   {line}");
        }
        Ok(digests)
    }
}

impl ContentHasher for ShasumHasher {
    fn compute_digests(&self, label: &str, paths: &[String]) -> Result<Digests> {
        // Many hashing tools read stdin forever when given no arguments
        if paths.is_empty() {
            return Ok(Digests::new());
        }

        let progress = HashProgress::new(label, paths.len() as u64);
        let mut digests = Digests::new();
        let mut processed = 0usize;
        for batch in paths.chunks(self.batch_size) {
            digests.extend(self.run_batch(label, batch)?);
            processed += batch.len();
            progress.set_processed(processed as u64);
        }
        progress.finish();

        Ok(digests)
    }
}
