// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable context storage for rotor.
//!
//! Layout: a JSONL write-ahead journal of store operations plus periodic
//! zstd-compressed snapshots of the materialized state. Opening a store
//! loads the latest snapshot and replays journal entries after its
//! sequence number.

mod checkpoint;
mod snapshot;
mod state;
mod store;
mod wal;

pub use checkpoint::{CheckpointError, CheckpointWriter, Checkpointer, FsCheckpointWriter};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::{MaterializedState, StoreOp};
pub use store::{ContextStore, StoreError};
pub use wal::{Wal, WalEntry, WalError};
