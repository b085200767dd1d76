// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpointing with zstd compression and durable fsync.
//!
//! A checkpoint writes the materialized state as a compressed snapshot with
//! the fsync ordering crash recovery needs: the snapshot must be durable
//! (including the directory fsync for the rename) before the journal is
//! truncated.
//!
//! The `CheckpointWriter` trait abstracts the I/O operations, enabling
//! deterministic unit tests with a fake writer and verification of the
//! fsync ordering.

use crate::{MaterializedState, Snapshot};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compress(String),
}

/// Trait abstracting checkpoint I/O for testability.
pub trait CheckpointWriter: Send + Sync + 'static {
    /// Write compressed snapshot data to a temporary file.
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError>;

    /// Fsync a file to ensure data is durable.
    fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError>;

    /// Atomically rename tmp file to final path.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError>;

    /// Fsync directory to make the rename durable.
    fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError>;
}

/// Production checkpoint writer using real filesystem operations.
#[derive(Clone)]
pub struct FsCheckpointWriter;

impl CheckpointWriter for FsCheckpointWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(data)?;
        Ok(())
    }

    fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError> {
        let file = File::open(path)?;
        file.sync_all()?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError> {
        let dir = File::open(path)?;
        dir.sync_all()?;
        Ok(())
    }
}

/// Writes compressed snapshots with the durability ordering the journal
/// truncation depends on.
pub struct Checkpointer<W: CheckpointWriter = FsCheckpointWriter> {
    writer: W,
    snapshot_path: PathBuf,
    compression_level: i32,
}

impl Checkpointer<FsCheckpointWriter> {
    /// Create a new checkpointer with the default filesystem writer.
    pub fn new(snapshot_path: PathBuf) -> Self {
        Self::with_writer(FsCheckpointWriter, snapshot_path)
    }
}

impl<W: CheckpointWriter> Checkpointer<W> {
    /// Create a checkpointer with a custom writer (for testing).
    pub fn with_writer(writer: W, snapshot_path: PathBuf) -> Self {
        Self {
            writer,
            snapshot_path,
            // zstd level 3 is a good balance of speed and compression
            compression_level: 3,
        }
    }

    /// Set the zstd compression level (1-22, default 3).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Write a durable snapshot of `state` at journal sequence `seq`.
    ///
    /// Only after this returns successfully is it safe to truncate the
    /// journal up to `seq`.
    pub fn checkpoint(&self, seq: u64, state: &MaterializedState) -> Result<(), CheckpointError> {
        let tmp_path = self.snapshot_path.with_extension("tmp");

        // 1. Build + serialize the snapshot
        let snapshot = Snapshot::new(seq, state.clone());
        let json_bytes = serde_json::to_vec(&snapshot)?;

        // 2. Compress with zstd
        let compressed = zstd::encode_all(json_bytes.as_slice(), self.compression_level)
            .map_err(|e| CheckpointError::Compress(e.to_string()))?;

        // 3. Write to temp file, fsync it, rename into place
        self.writer.write_tmp(&tmp_path, &compressed)?;
        self.writer.fsync_file(&tmp_path)?;
        self.writer.rename(&tmp_path, &self.snapshot_path)?;

        // 4. Fsync directory: the rename itself must be durable before
        //    journal truncation
        if let Some(parent) = self.snapshot_path.parent() {
            self.writer.fsync_dir(parent)?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
