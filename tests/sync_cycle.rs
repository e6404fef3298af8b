mod common;

use std::fs;

use common::{stored_records, Fixture};
use kl_sync::logger::TextLogger;
use kl_sync::state::FolderSyncState;
use kl_sync::syncer::{RunSummary, Syncer};

#[test]
fn test_empty_folder_first_run() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.root.join("docs")).unwrap();
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());

    let summary = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport)
        .sync_all(None)
        .unwrap();

    assert_eq!(summary, RunSummary { synced: 1, failed: 0, skipped: 0 });
    assert!(transport.uploads.borrow().is_empty());
    assert_eq!(*transport.downloads.borrow(), vec!["docs"]);
    assert!(stored_records(&fx.layout, "docs").is_empty());
    assert!(!fx.layout.lock_file("docs").exists());
}

#[test]
fn test_second_run_uploads_nothing() {
    let fx = Fixture::new();
    fx.write_local("docs/a.txt", "alpha");
    fx.write_local("docs/sub/b.txt", "beta");
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());
    let syncer = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport);

    syncer.sync_all(None).unwrap();
    assert_eq!(
        transport.uploads.borrow()[0],
        vec!["docs/a.txt".to_string(), "docs/sub/b.txt".to_string()]
    );
    assert_eq!(fs::read_to_string(fx.remote.join("docs/sub/b.txt")).unwrap(), "beta");
    assert_eq!(stored_records(&fx.layout, "docs").len(), 2);

    let summary = syncer.sync_all(None).unwrap();
    assert!(summary.is_success());
    assert_eq!(transport.uploads.borrow().len(), 1);
    assert_eq!(transport.downloads.borrow().len(), 2);
}

#[test]
fn test_local_edit_is_uploaded() {
    let fx = Fixture::new();
    let file = fx.write_local("docs/a.txt", "v1");
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());
    let syncer = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport);
    syncer.sync_all(None).unwrap();

    fs::write(&file, "v2, longer").unwrap();
    filetime::set_file_mtime(&file, filetime::FileTime::now()).unwrap();
    syncer.sync_all(None).unwrap();

    let uploads = transport.uploads.borrow();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[1], vec!["docs/a.txt".to_string()]);
}

#[test]
fn test_upload_failure_is_retried_next_run() {
    let fx = Fixture::new();
    fx.write_local("docs/a.txt", "alpha");
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());
    let syncer = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport);

    transport.fail_upload.set(true);
    let summary = syncer.sync_all(None).unwrap();
    assert_eq!(summary.failed, 1);
    assert!(transport.downloads.borrow().is_empty());
    assert!(!fx.layout.info_file("docs").exists());
    assert!(!fx.remote.join("docs/a.txt").exists());

    transport.fail_upload.set(false);
    let summary = syncer.sync_all(None).unwrap();
    assert!(summary.is_success());
    assert_eq!(transport.uploads.borrow()[1], vec!["docs/a.txt".to_string()]);
    assert!(fx.remote.join("docs/a.txt").exists());
}

#[test]
fn test_download_failure_still_records_arrivals() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.root.join("docs")).unwrap();
    fx.write_remote("docs/from-server.txt", "remote bytes");
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());
    transport.fail_download.set(true);

    let summary = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport)
        .sync_all(None)
        .unwrap();
    assert_eq!(summary, RunSummary { synced: 0, failed: 1, skipped: 0 });

    let state = FolderSyncState::open(&fx.layout, &settings, "docs").unwrap();
    let record = state.record("docs/from-server.txt").expect("downloaded file recorded");
    assert!(record.digest.is_some());
}

#[test]
fn test_downloaded_file_is_not_uploaded_back() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.root.join("docs")).unwrap();
    fx.write_remote("docs/from-server.txt", "remote bytes");
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());
    let syncer = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport);

    syncer.sync_all(None).unwrap();
    assert!(fx.root.join("docs/from-server.txt").exists());

    syncer.sync_all(None).unwrap();
    assert!(transport.uploads.borrow().is_empty());
}

#[test]
fn test_locked_folder_is_skipped() {
    let fx = Fixture::new();
    fx.write_local("docs/a.txt", "alpha");
    fx.write_local("photos/p.jpg", "jpeg");
    fs::write(fx.layout.lock_file("photos"), "another machine").unwrap();
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());

    let summary = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport)
        .sync_all(None)
        .unwrap();
    assert_eq!(summary, RunSummary { synced: 1, failed: 0, skipped: 1 });
    assert!(summary.is_success());
    assert_eq!(*transport.downloads.borrow(), vec!["docs"]);
    assert_eq!(
        fs::read_to_string(fx.layout.lock_file("photos")).unwrap(),
        "another machine"
    );
    assert!(!fx.layout.info_file("photos").exists());
}

#[test]
fn test_explicit_folder_is_created_and_logged() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let (hasher, transport) = (fx.hasher(), fx.transport());
    let log_path = fx.root.join("logs/run.log");
    let logger = TextLogger::new(&log_path).unwrap();

    let folders = vec!["music".to_string()];
    let summary = Syncer::new(fx.layout.clone(), &settings, &hasher, &transport)
        .with_logger(&logger)
        .sync_all(Some(&folders))
        .unwrap();

    assert_eq!(summary.synced, 1);
    assert!(fx.root.join("music").is_dir());
    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("START root="));
    assert!(log.contains("FOLDER folder=music"));
    assert!(log.contains("DONE synced=1 failed=0 skipped=0"));
}
