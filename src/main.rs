//! kl-sync - keeps local folder trees in step with one remote archive
//!
//! Each run walks the top-level folders under the root, up-syncs whatever
//! changed locally, then down-syncs the archive's copy of the folder.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use kl_sync::bootstrap::{self, ConnectOutcome};
use kl_sync::cli::Args;
use kl_sync::error::{Severity, SyncError};
use kl_sync::hasher::ShasumHasher;
use kl_sync::layout::SyncLayout;
use kl_sync::logger::{Logger, NoopLogger, TextLogger};
use kl_sync::syncer::{Interrupt, Syncer};
use kl_sync::transfer::RsyncTransport;

const EXIT_FOLDER_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let args = Args::parse();

    // The current step finishes (and unlocks) before we exit
    let interrupt = Interrupt::new();
    let handler_flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing the current step and unlocking...");
        handler_flag.trigger();
    }) {
        eprintln!("💀 WARNING: could not install signal handler: {e}");
    }

    match run(&args, interrupt) {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<SyncError>().map(SyncError::severity) {
            Some(Severity::Interrupted) => {
                eprintln!("Interrupted by user.");
                ExitCode::from(EXIT_INTERRUPTED)
            }
            _ => {
                eprintln!("💀 ERROR: {e:#}");
                ExitCode::from(EXIT_FATAL)
            }
        },
    }
}

fn run(args: &Args, interrupt: Interrupt) -> Result<ExitCode> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("sync root {} does not exist", args.root.display()))?;
    let layout = SyncLayout::new(&root);

    if args.create {
        let settings_path = layout.settings_file();
        if bootstrap::create_settings(&layout).context("creating settings stub")? {
            println!("✅ created {}; edit it before the first sync", settings_path.display());
        } else {
            println!("{} already exists", settings_path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(remote) = &args.connect {
        match bootstrap::connect(&layout, remote).context("connecting to remote archive")? {
            ConnectOutcome::AlreadyConfigured => {
                println!("{} already exists; not fetching", layout.settings_file().display())
            }
            ConnectOutcome::Pulled => println!("✅ fetched settings from {remote}"),
            ConnectOutcome::Stub => println!(
                "✅ wrote {}; edit it before the first sync",
                layout.settings_file().display()
            ),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let settings = bootstrap::load_settings(&layout)?;

    // Choose logger once; NoopLogger when no file was asked for
    let logger: Arc<dyn Logger> = match &args.log_file {
        Some(p) => Arc::new(
            TextLogger::new(p).with_context(|| format!("opening log file {}", p.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    let hasher = ShasumHasher::new(&root, settings.hash_command());
    let transport = RsyncTransport::new(&settings, &root);
    let syncer = Syncer::new(layout, &settings, &hasher, &transport)
        .with_logger(logger.as_ref())
        .with_interrupt(interrupt);

    let summary = syncer.sync_all(args.folder_list())?;
    println!(
        "✅ {} synced, {} failed, {} skipped",
        summary.synced, summary.failed, summary.skipped
    );

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FOLDER_FAILED))
    }
}
