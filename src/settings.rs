//! Per-run sync settings loaded from `.sync/sync_settings.txt`
//!
//! The settings file is YAML. It is parsed into [`SettingsFile`] (the raw,
//! hand-editable shape) and then validated into [`Settings`], the immutable
//! value every other component receives. A `Settings` can only be produced by
//! validation, and validation refuses files whose `settings_are_set` flag is
//! not on.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DEFAULT_TRANSFER_PROGRAM: &str = "rsync";
pub const DEFAULT_SLEEP_TIME: i64 = 2;

pub fn default_hash_command() -> Vec<String> {
    vec!["shasum".to_string(), "-b".to_string()]
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings from {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("could not parse settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("please edit {0} with your sync settings, and set settings_are_set to Yes")]
    NotAcknowledged(PathBuf),

    #[error("please specify upstream_folder in {0}")]
    MissingUpstream(PathBuf),

    #[error("please specify sleep_time >= 0 in {0} (found {1})")]
    NegativeSleep(PathBuf, i64),

    #[error("hash_command in {0} must name a program")]
    EmptyHashCommand(PathBuf),

    #[error("transfer_program in {0} must not be empty")]
    EmptyTransferProgram(PathBuf),
}

/// Raw contents of the settings file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(default)]
    pub upstream_folder: Option<String>,

    #[serde(default = "default_sleep_time")]
    pub sleep_time: i64,

    #[serde(default, deserialize_with = "flag")]
    pub rsync_delete: bool,

    #[serde(default, deserialize_with = "flag")]
    pub rsync_dry_run: bool,

    #[serde(default, deserialize_with = "flag")]
    pub rsync_progress: bool,

    #[serde(default, deserialize_with = "flag")]
    pub fast_mode: bool,

    #[serde(default)]
    pub fast_mode_include_root_folders: Vec<String>,

    #[serde(default)]
    pub fast_mode_exclude_root_folders: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_program: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_command: Option<Vec<String>>,

    #[serde(default, deserialize_with = "flag")]
    pub settings_are_set: bool,
}

fn default_sleep_time() -> i64 {
    DEFAULT_SLEEP_TIME
}

/// Accept YAML booleans as well as yes/no words; hand-edited files use both
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Word(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Flag::Bool(b)) => Ok(b),
        Some(Flag::Word(word)) => match word.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "on" => Ok(true),
            "no" | "n" | "false" | "off" | "" => Ok(false),
            other => Err(D::Error::custom(format!("expected yes or no, found {other:?}"))),
        },
    }
}

impl Default for SettingsFile {
    /// The values written into a freshly created stub
    fn default() -> Self {
        Self {
            upstream_folder: None,
            sleep_time: DEFAULT_SLEEP_TIME,
            rsync_delete: false,
            rsync_dry_run: true,
            rsync_progress: true,
            fast_mode: false,
            fast_mode_include_root_folders: Vec::new(),
            fast_mode_exclude_root_folders: Vec::new(),
            transfer_program: None,
            hash_command: None,
            settings_are_set: false,
        }
    }
}

impl SettingsFile {
    pub fn parse(text: &str, origin: &Path) -> Result<Self, SettingsError> {
        serde_yaml::from_str(text).map_err(|source| SettingsError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Check the acknowledgment flag and every field, producing run settings
    pub fn validate(self, origin: &Path) -> Result<Settings, SettingsError> {
        if !self.settings_are_set {
            return Err(SettingsError::NotAcknowledged(origin.to_path_buf()));
        }

        let upstream_endpoint = self
            .upstream_folder
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SettingsError::MissingUpstream(origin.to_path_buf()))?;

        if self.sleep_time < 0 {
            return Err(SettingsError::NegativeSleep(
                origin.to_path_buf(),
                self.sleep_time,
            ));
        }

        let hash_command = self.hash_command.unwrap_or_else(default_hash_command);
        if hash_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(SettingsError::EmptyHashCommand(origin.to_path_buf()));
        }

        let transfer_program = self
            .transfer_program
            .unwrap_or_else(|| DEFAULT_TRANSFER_PROGRAM.to_string());
        if transfer_program.trim().is_empty() {
            return Err(SettingsError::EmptyTransferProgram(origin.to_path_buf()));
        }

        Ok(Settings {
            upstream_endpoint,
            cycle_delay: Duration::from_secs(self.sleep_time as u64),
            dry_run: self.rsync_dry_run,
            allow_delete: self.rsync_delete,
            show_progress: self.rsync_progress,
            fast_mode_enabled: self.fast_mode,
            fast_mode_include: self.fast_mode_include_root_folders.into_iter().collect(),
            fast_mode_exclude: self.fast_mode_exclude_root_folders.into_iter().collect(),
            transfer_program,
            hash_command,
        })
    }
}

/// Validated, immutable settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    upstream_endpoint: String,
    cycle_delay: Duration,
    dry_run: bool,
    allow_delete: bool,
    show_progress: bool,
    fast_mode_enabled: bool,
    fast_mode_include: BTreeSet<String>,
    fast_mode_exclude: BTreeSet<String>,
    transfer_program: String,
    hash_command: Vec<String>,
}

impl Settings {
    /// Load and validate the settings file at `path`
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text =
            fs::read_to_string(path).map_err(|e| SettingsError::Read(path.to_path_buf(), e))?;
        SettingsFile::parse(&text, path)?.validate(path)
    }

    pub fn upstream_endpoint(&self) -> &str {
        &self.upstream_endpoint
    }

    /// Minimum pause between consecutive transfer tool connections
    pub fn cycle_delay(&self) -> Duration {
        self.cycle_delay
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn allow_delete(&self) -> bool {
        self.allow_delete
    }

    pub fn show_progress(&self) -> bool {
        self.show_progress
    }

    pub fn fast_mode_enabled(&self) -> bool {
        self.fast_mode_enabled
    }

    pub fn transfer_program(&self) -> &str {
        &self.transfer_program
    }

    pub fn hash_command(&self) -> &[String] {
        &self.hash_command
    }

    /// Whether `folder` skips hashing and relies on modification times only.
    ///
    /// Exclusion wins over inclusion; an empty include set means every folder.
    pub fn uses_fast_mode(&self, folder: &str) -> bool {
        self.fast_mode_enabled
            && (self.fast_mode_include.is_empty() || self.fast_mode_include.contains(folder))
            && !self.fast_mode_exclude.contains(folder)
    }
}

/// Write a stub settings file the user must edit before syncing
pub fn write_stub(path: &Path, upstream: Option<&str>) -> std::io::Result<()> {
    let upstream = upstream.unwrap_or("user@example.com:/Path/to/archive");
    let stub = format!(
        r#"# kl-sync settings. Edit this file, then set settings_are_set to Yes.

# rsync destination shared by every machine syncing this archive (usually host:/path over ssh)
upstream_folder: "{upstream}"

# seconds to wait between transfer tool connections; raise it if the server throttles ssh
sleep_time: {DEFAULT_SLEEP_TIME}

# let the server delete local files (moves on the server then move locally instead of duplicating)
rsync_delete: No

# transfer nothing; turn off after a test run or two looks right
rsync_dry_run: Yes

# show rsync progress output
rsync_progress: Yes

# compare modification times only instead of content digests
fast_mode: No

# with fast_mode on: root folders to use it for (empty means all), and root folders to never use it for
# e.g. [ "my_folder", "my_other_folder" ]
fast_mode_include_root_folders: []
fast_mode_exclude_root_folders: []

# set to Yes once this file is configured
settings_are_set: No
"#
    );

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::File::create(path)?;
    f.write_all(stub.as_bytes())?;
    f.sync_all()
}
