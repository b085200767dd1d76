// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable context store.
//!
//! `ContextStore` is the persistence surface the engine consumes: context
//! upserts, event/history appends, paused-instance queries. Internally it
//! journals every operation, serves reads from the materialized state, and
//! checkpoints periodically so reopen stays cheap.

use crate::checkpoint::Checkpointer;
use crate::snapshot::Snapshot;
use crate::state::{MaterializedState, StoreOp};
use crate::wal::Wal;
use parking_lot::Mutex;
use rotor_core::{ContextId, Event, StateContext, StateHistoryEntry};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

/// Journal appends between automatic checkpoints.
const CHECKPOINT_THRESHOLD: u64 = 512;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("journal error: {0}")]
    Wal(#[from] crate::wal::WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] crate::snapshot::SnapshotError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] crate::checkpoint::CheckpointError),
}

/// Durable store for instance contexts, event logs, and transition history.
///
/// All methods take `&self`; interior mutexes make a shared
/// `Arc<ContextStore>` safe across executor tasks. The single-writer-per-
/// instance property is the engine's to enforce.
pub struct ContextStore {
    wal: Mutex<Wal>,
    state: Mutex<MaterializedState>,
    checkpointer: Checkpointer,
    appends_since_checkpoint: AtomicU64,
}

impl ContextStore {
    /// Open (or create) a store rooted at `dir`.
    ///
    /// Loads the latest snapshot, replays journal entries after its
    /// sequence, and leaves the journal open for appends.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(crate::wal::WalError::Io)?;

        let snapshot_path = Self::snapshot_path(dir);
        let (mut state, snapshot_seq) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => {
                info!(
                    seq = snapshot.seq,
                    contexts = snapshot.state.contexts.len(),
                    "loaded store snapshot"
                );
                (snapshot.state, snapshot.seq)
            }
            None => {
                info!("no snapshot found, starting with empty state");
                (MaterializedState::default(), 0)
            }
        };

        let wal = Wal::open(&Self::wal_path(dir))?;
        let entries = wal.entries_after(snapshot_seq)?;
        let replayed = entries.len();
        for entry in entries {
            state.apply_op(&entry.op);
        }
        if replayed > 0 {
            info!(replayed, after_seq = snapshot_seq, "replayed journal entries");
        }

        Ok(Self {
            wal: Mutex::new(wal),
            state: Mutex::new(state),
            checkpointer: Checkpointer::new(snapshot_path),
            appends_since_checkpoint: AtomicU64::new(0),
        })
    }

    fn wal_path(dir: &Path) -> PathBuf {
        dir.join("journal.wal")
    }

    fn snapshot_path(dir: &Path) -> PathBuf {
        dir.join("snapshot.zst")
    }

    /// Upsert a context by id. Replaces state maps, current state, and
    /// timestamps wholesale.
    pub fn save_context(&self, ctx: &StateContext) -> Result<(), StoreError> {
        self.append_all(&[StoreOp::ContextSaved {
            context: ctx.clone(),
        }])
    }

    /// Load a context by id.
    pub fn load_context(&self, id: &str) -> Option<StateContext> {
        self.state.lock().get_context(id).cloned()
    }

    /// Delete a context; cascades to its event log, history, and any pause
    /// markers (they live inside the context row).
    pub fn delete_context(&self, id: &str) -> Result<(), StoreError> {
        self.append_all(&[StoreOp::ContextDeleted {
            context_id: ContextId::new(id),
        }])
    }

    /// All context ids, most recently updated first.
    pub fn list_context_ids(&self) -> Vec<ContextId> {
        self.state.lock().context_ids_by_recency()
    }

    /// Append an event to a context's log.
    pub fn save_event(&self, context_id: &str, event: &Event) -> Result<(), StoreError> {
        self.append_all(&[StoreOp::EventAppended {
            context_id: ContextId::new(context_id),
            event: event.clone(),
        }])
    }

    /// Append a transition history row.
    pub fn save_state_history(&self, entry: &StateHistoryEntry) -> Result<(), StoreError> {
        self.append_all(&[StoreOp::HistoryAppended {
            entry: entry.clone(),
        }])
    }

    /// Persist one transition step as a unit: optional event, then the
    /// history row, then the context, in that order, flushed with a single
    /// fsync. Replay of a torn batch can therefore never surface a context
    /// whose current state lacks its history entry.
    pub fn save_step(
        &self,
        event: Option<&Event>,
        entry: &StateHistoryEntry,
        ctx: &StateContext,
    ) -> Result<(), StoreError> {
        let mut ops = Vec::with_capacity(3);
        if let Some(event) = event {
            ops.push(StoreOp::EventAppended {
                context_id: ctx.id.clone(),
                event: event.clone(),
            });
        }
        ops.push(StoreOp::HistoryAppended {
            entry: entry.clone(),
        });
        ops.push(StoreOp::ContextSaved {
            context: ctx.clone(),
        });
        self.append_all(&ops)
    }

    /// Transition history for a context, ascending by timestamp.
    pub fn get_state_history(&self, id: &str) -> Vec<StateHistoryEntry> {
        self.state.lock().history_for(id).to_vec()
    }

    /// Full event log for a context (the in-context `recent_events` window
    /// is bounded; this is not).
    pub fn get_event_history(&self, id: &str) -> Vec<Event> {
        self.state.lock().events_for(id).to_vec()
    }

    /// Ids of all instances whose metadata carries the `_pausedAt` marker.
    pub fn find_paused_instances(&self) -> Vec<ContextId> {
        self.state.lock().find_paused()
    }

    /// Number of stored contexts.
    pub fn context_count(&self) -> usize {
        self.state.lock().contexts.len()
    }

    /// Append a batch of operations, apply them to the materialized state,
    /// and flush. The journal write happens first; state only reflects
    /// operations the journal has accepted.
    fn append_all(&self, ops: &[StoreOp]) -> Result<(), StoreError> {
        {
            let mut wal = self.wal.lock();
            for op in ops {
                wal.append(op)?;
            }
            wal.flush()?;
        }
        {
            let mut state = self.state.lock();
            for op in ops {
                state.apply_op(op);
            }
        }

        let appended = self
            .appends_since_checkpoint
            .fetch_add(ops.len() as u64, Ordering::Relaxed)
            + ops.len() as u64;
        if appended >= CHECKPOINT_THRESHOLD {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Write a durable snapshot and truncate the journal behind it.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let (seq, state) = {
            let mut wal = self.wal.lock();
            wal.flush()?;
            (wal.write_seq(), self.state.lock().clone())
        };

        self.checkpointer.checkpoint(seq, &state)?;
        self.appends_since_checkpoint.store(0, Ordering::Relaxed);

        // Keep the entry at exactly `seq`: a reopen rescans the journal for
        // its high-water mark, and replay is strictly-after so the overlap
        // is never applied twice.
        let mut wal = self.wal.lock();
        wal.truncate_before(seq)?;
        debug!(seq, "store checkpoint complete");
        Ok(())
    }

    /// Flush buffered journal writes.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.wal.lock().flush()?;
        Ok(())
    }

    /// Flush and write a final snapshot so the next open skips replay.
    pub fn close(&self) -> Result<(), StoreError> {
        self.checkpoint()?;
        info!(contexts = self.context_count(), "store closed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
