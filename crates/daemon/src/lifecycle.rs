// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use rotor_core::SystemClock;
use rotor_engine::{Engine, EngineError, ExecutorConfig, HandlerTable, WorkflowExecutor};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/rotor)
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Directory for the context store (journal + snapshot)
    pub store_dir: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Uses fixed paths under `$ROTOR_STATE_DIR`, `$XDG_STATE_HOME/rotor`,
    /// or `~/.local/state/rotor`.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        Ok(Self::at(state_dir))
    }

    /// Configuration rooted at an explicit state directory.
    pub fn at(state_dir: PathBuf) -> Self {
        Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            store_dir: state_dir.join("store"),
            state_dir,
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub engine: Arc<Engine<SystemClock>>,
    pub executor: Arc<WorkflowExecutor<SystemClock>>,
    pub start_time: Instant,
}

/// Result of daemon startup.
pub struct StartupResult {
    pub daemon: DaemonState,
    /// The Unix socket listener to spawn as a task
    pub listener: UnixListener,
}

impl std::fmt::Debug for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonState").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Start the daemon: open the store, build the engine, restore paused
/// instances, start the timeout monitor, and bind the socket.
pub async fn startup(config: &Config, flow_path: &Path) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config, flow_path).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Lock failure means another daemon owns these files
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config, flow_path: &Path) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Acquire lock file FIRST - prevents races. Avoid truncating before the
    // lock is held, which would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // The stock daemon serves flows as pure routing (no business handlers);
    // embedding applications bind their own handler tables via the library.
    let engine = Arc::new(Engine::from_config(
        flow_path,
        &config.store_dir,
        HandlerTable::new(),
    )?);

    let executor = WorkflowExecutor::new(SystemClock, ExecutorConfig::default());
    executor.register_engine(Arc::clone(&engine), None);
    executor.start_monitor();

    let restored = executor.restore_paused_instances(&engine, &[]).await;
    if restored > 0 {
        info!(restored, "restored paused instances");
    }

    // Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(
        flow = %engine.flow().name,
        socket = %config.socket_path.display(),
        "daemon started"
    );

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            engine,
            executor,
            start_time: Instant::now(),
        },
        listener,
    })
}

impl DaemonState {
    /// Shutdown the daemon gracefully: cancel drivers and the monitor,
    /// flush + snapshot the store, release socket and lock files.
    pub fn shutdown(&mut self) {
        info!("shutting down daemon...");

        self.executor.stop_all();

        if let Err(e) = self.engine.close() {
            warn!("failed to close store on shutdown: {}", e);
        }

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("failed to remove socket file: {}", e);
            }
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("failed to remove PID file: {}", e);
            }
        }

        info!("daemon shutdown complete");
    }
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// Get the state directory for rotor
fn state_dir() -> Result<PathBuf, LifecycleError> {
    // ROTOR_STATE_DIR takes priority (used by tests for isolation)
    if let Ok(dir) = std::env::var("ROTOR_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }

    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("rotor"));
    }

    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/rotor"))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
