//! kl-sync library
//!
//! Change detection and two-phase sync orchestration around an external
//! rsync-compatible transfer tool

pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod fs_enum;
pub mod hasher;
pub mod layout;
pub mod logger;
pub mod progress;
pub mod relay;
pub mod settings;
pub mod state;
pub mod syncer;
pub mod transfer;
