// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from journal replay.

use rotor_core::{ContextId, Event, StateContext, StateHistoryEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One durable store operation, the unit the journal records.
///
/// Serializes with `{"op": "context:saved", ...fields}` tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum StoreOp {
    /// Upsert of an instance context (full replacement by id).
    #[serde(rename = "context:saved")]
    ContextSaved { context: StateContext },

    /// Append to an instance's event log.
    #[serde(rename = "event:appended")]
    EventAppended {
        context_id: ContextId,
        event: Event,
    },

    /// Append to an instance's transition history.
    #[serde(rename = "history:appended")]
    HistoryAppended { entry: StateHistoryEntry },

    /// Delete of a context and everything attached to it.
    #[serde(rename = "context:deleted")]
    ContextDeleted { context_id: ContextId },
}

impl StoreOp {
    /// Operation name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::ContextSaved { .. } => "context:saved",
            StoreOp::EventAppended { .. } => "event:appended",
            StoreOp::HistoryAppended { .. } => "history:appended",
            StoreOp::ContextDeleted { .. } => "context:deleted",
        }
    }

    /// The context this operation belongs to.
    pub fn context_id(&self) -> &ContextId {
        match self {
            StoreOp::ContextSaved { context } => &context.id,
            StoreOp::EventAppended { context_id, .. } => context_id,
            StoreOp::HistoryAppended { entry } => &entry.context_id,
            StoreOp::ContextDeleted { context_id } => context_id,
        }
    }
}

/// Materialized store state built by replaying journal operations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub contexts: HashMap<String, StateContext>,
    #[serde(default)]
    pub events: HashMap<String, Vec<Event>>,
    #[serde(default)]
    pub history: HashMap<String, Vec<StateHistoryEntry>>,
}

impl MaterializedState {
    /// Apply an operation to derive state changes.
    ///
    /// Handlers are idempotent: replaying the same operation twice yields
    /// the same state as applying it once. Context saves are full
    /// replacements, event appends are guarded by event id, history appends
    /// are guarded by an identity check against the tail entry.
    pub fn apply_op(&mut self, op: &StoreOp) {
        match op {
            StoreOp::ContextSaved { context } => {
                self.contexts
                    .insert(context.id.as_str().to_string(), context.clone());
            }
            StoreOp::EventAppended { context_id, event } => {
                let log = self.events.entry(context_id.as_str().to_string()).or_default();
                if !log.iter().any(|e| e.id == event.id) {
                    log.push(event.clone());
                }
            }
            StoreOp::HistoryAppended { entry } => {
                let rows = self
                    .history
                    .entry(entry.context_id.as_str().to_string())
                    .or_default();
                if rows.last() != Some(entry) {
                    rows.push(entry.clone());
                }
            }
            StoreOp::ContextDeleted { context_id } => {
                self.contexts.remove(context_id.as_str());
                self.events.remove(context_id.as_str());
                self.history.remove(context_id.as_str());
            }
        }
    }

    /// Look up a context by id.
    pub fn get_context(&self, id: &str) -> Option<&StateContext> {
        self.contexts.get(id)
    }

    /// All context ids, most recently updated first.
    pub fn context_ids_by_recency(&self) -> Vec<ContextId> {
        let mut rows: Vec<&StateContext> = self.contexts.values().collect();
        rows.sort_by(|a, b| b.last_updated_at_ms.cmp(&a.last_updated_at_ms));
        rows.into_iter().map(|c| c.id.clone()).collect()
    }

    /// Ids of every context whose metadata carries the `_pausedAt` marker.
    pub fn find_paused(&self) -> Vec<ContextId> {
        self.contexts
            .values()
            .filter(|c| c.is_paused())
            .map(|c| c.id.clone())
            .collect()
    }

    /// Transition history for a context, ascending by timestamp.
    pub fn history_for(&self, id: &str) -> &[StateHistoryEntry] {
        self.history.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Full event log for a context, append order.
    pub fn events_for(&self, id: &str) -> &[Event] {
        self.events.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
