//! Ferry Runner
//!
//! The machine-side half of the import system.
//!
//! - `ferry-dispatcher` runs periodically on each import machine. It checks
//!   the machine's state, claims at most one job, and starts a worker.
//! - `ferry-worker` runs one job: it fetches the import parameters, drives
//!   the version control tools, heartbeats with the tail of its output, and
//!   reports the result with its log.

pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod repository;
pub mod service;
pub mod worker;

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber
///
/// `RUST_LOG` wins over `verbosity`. When `log_file` is given, events are
/// also appended to it without colour codes.
pub fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ferry_runner={},ferry_client={}", level, level).into());

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
