// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rotor daemon (rotord)
//!
//! Background process serving one flow definition over a Unix socket:
//! starting instances, delivering events, reporting paused instances, and
//! enforcing pause timeouts.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod listener;
mod protocol;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

use crate::lifecycle::{Config, LifecycleError, StartupResult};
use crate::listener::{ListenCtx, Listener};

fn print_usage() {
    println!("Usage: rotord <flow-config> [state-dir]");
    println!();
    println!("  <flow-config>  Path to a flow document (.json, .yaml, .yml)");
    println!("  [state-dir]    State directory (default: $ROTOR_STATE_DIR,");
    println!("                 $XDG_STATE_HOME/rotor, or ~/.local/state/rotor)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let flow_path = match args.next() {
        Some(arg) if arg == "--version" || arg == "-V" => {
            println!("rotord {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(arg) if arg == "--help" || arg == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(arg) => PathBuf::from(arg),
        None => {
            print_usage();
            std::process::exit(1);
        }
    };

    let config = match args.next() {
        Some(dir) => Config::at(PathBuf::from(dir)),
        None => Config::load()?,
    };

    let _log_guard = setup_logging(&config)?;

    info!(flow = %flow_path.display(), "starting rotor daemon");

    let StartupResult {
        mut daemon,
        listener: unix_listener,
    } = match lifecycle::startup(&config, &flow_path).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("rotord is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Unrecoverable startup failure (store open, bad flow document)
            error!("failed to start daemon: {}", e);
            eprintln!("rotord: {e}");
            std::process::exit(1);
        }
    };

    // Shutdown signal: a Notify rather than an event so shutdown requests
    // are never persisted or replayed.
    let shutdown = Arc::new(Notify::new());

    let ctx = Arc::new(ListenCtx {
        engine: Arc::clone(&daemon.engine),
        executor: Arc::clone(&daemon.executor),
        shutdown: Arc::clone(&shutdown),
    });
    tokio::spawn(Listener::new(unix_listener, ctx).run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "daemon ready");

    // Signal ready for the parent process waiting on startup
    println!("READY");

    tokio::select! {
        _ = shutdown.notified() => info!("shutdown requested via socket"),
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    daemon.shutdown();
    Ok(())
}

/// Set up file logging with env-filter control (`ROTOR_LOG`).
fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.state_dir)?;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_from_env("ROTOR_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
