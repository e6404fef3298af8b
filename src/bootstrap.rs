//! First-run setup of the `.sync` control directory

use std::path::Path;

use crate::error::{Result, SyncError};
use crate::layout::SyncLayout;
use crate::settings::{write_stub, Settings, SettingsError, DEFAULT_TRANSFER_PROGRAM};
use crate::transfer::{fetch_file, TransferOutcome};

/// How `--connect` obtained a settings file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A local settings file was already there; nothing was touched
    AlreadyConfigured,
    /// The shared settings file was copied from the remote
    Pulled,
    /// The remote had none; a stub pointing at it was written
    Stub,
}

fn write_settings_stub(layout: &SyncLayout, upstream: Option<&str>) -> Result<()> {
    let path = layout.settings_file();
    write_stub(&path, upstream).map_err(|e| SyncError::Persist { path, source: e })
}

/// Create `.sync/` and a stub settings file. Returns false if one already exists.
pub fn create_settings(layout: &SyncLayout) -> Result<bool> {
    if layout.settings_file().exists() {
        return Ok(false);
    }
    write_settings_stub(layout, None)?;
    Ok(true)
}

/// Load the run settings, creating a stub for the user to edit when absent
pub fn load_settings(layout: &SyncLayout) -> Result<Settings> {
    let path = layout.settings_file();
    if !path.exists() {
        write_settings_stub(layout, None)?;
        return Err(SettingsError::NotAcknowledged(path).into());
    }
    Ok(Settings::load(&path)?)
}

/// Pull the shared settings from `remote` with the default transfer program
pub fn connect(layout: &SyncLayout, remote: &str) -> Result<ConnectOutcome> {
    connect_with(layout, remote, |source, dest| {
        fetch_file(DEFAULT_TRANSFER_PROGRAM, source, dest)
    })
}

/// Same as [`connect`] with a caller-supplied fetch step
pub fn connect_with<F>(layout: &SyncLayout, remote: &str, fetch: F) -> Result<ConnectOutcome>
where
    F: FnOnce(&str, &Path) -> Result<TransferOutcome>,
{
    let dest = layout.settings_file();
    if dest.exists() {
        return Ok(ConnectOutcome::AlreadyConfigured);
    }
    layout.ensure_dot_sync()?;

    let source = format!(
        "{}/{}",
        remote.trim_end_matches('/'),
        SyncLayout::settings_rel_path()
    );
    let pulled = match fetch(&source, &dest) {
        Ok(outcome) => outcome.success && dest.is_file(),
        Err(e) => {
            println!("💀 WARNING: could not fetch {source}: {e}");
            false
        }
    };
    if pulled {
        return Ok(ConnectOutcome::Pulled);
    }

    println!("△ no settings found at {source}, writing a stub for {remote}");
    write_settings_stub(layout, Some(remote))?;
    Ok(ConnectOutcome::Stub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsFile;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_create_settings_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = SyncLayout::new(temp.path());
        assert!(create_settings(&layout).unwrap());
        fs::write(layout.settings_file(), "edited").unwrap();
        assert!(!create_settings(&layout).unwrap());
        assert_eq!(fs::read_to_string(layout.settings_file()).unwrap(), "edited");
    }

    #[test]
    fn test_missing_settings_writes_stub_and_fails() {
        let temp = TempDir::new().unwrap();
        let layout = SyncLayout::new(temp.path());
        let err = load_settings(&layout).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SyncError::Settings(SettingsError::NotAcknowledged(_))));
        assert!(layout.settings_file().is_file());

        // Still unacknowledged on the second run
        assert!(load_settings(&layout).unwrap_err().is_fatal());
    }

    #[test]
    fn test_connect_pulls_remote_settings() {
        let temp = TempDir::new().unwrap();
        let layout = SyncLayout::new(temp.path());
        let outcome = connect_with(&layout, "nas:/archive/", |source, dest| {
            assert_eq!(source, "nas:/archive/.sync/sync_settings.txt");
            fs::write(dest, "upstream_folder: nas:/archive\nsettings_are_set: yes\n").unwrap();
            Ok(TransferOutcome::succeeded())
        })
        .unwrap();
        assert_eq!(outcome, ConnectOutcome::Pulled);
        let settings = load_settings(&layout).unwrap();
        assert_eq!(settings.upstream_endpoint(), "nas:/archive");
    }

    #[test]
    fn test_connect_falls_back_to_stub() {
        let temp = TempDir::new().unwrap();
        let layout = SyncLayout::new(temp.path());
        let outcome = connect_with(&layout, "nas:/archive", |_, _| Ok(TransferOutcome::failed(23))).unwrap();
        assert_eq!(outcome, ConnectOutcome::Stub);

        let text = fs::read_to_string(layout.settings_file()).unwrap();
        let file = SettingsFile::parse(&text, &layout.settings_file()).unwrap();
        assert_eq!(file.upstream_folder.as_deref(), Some("nas:/archive"));
        assert!(!file.settings_are_set);
    }

    #[test]
    fn test_connect_keeps_existing_settings() {
        let temp = TempDir::new().unwrap();
        let layout = SyncLayout::new(temp.path());
        create_settings(&layout).unwrap();
        let outcome = connect_with(&layout, "nas:/archive", |_, _| panic!("must not fetch")).unwrap();
        assert_eq!(outcome, ConnectOutcome::AlreadyConfigured);
    }
}
