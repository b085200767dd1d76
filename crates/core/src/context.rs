// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance durable context.
//!
//! The context is the unit of persistence: one row per instance, rewritten
//! after every transition. `local_state` belongs to handlers, `global_state`
//! holds flow-wide read-mostly values, and `metadata` belongs to the engine,
//! including the three reserved pause-marker keys.

use crate::clock::Clock;
use crate::event::Event;
use crate::id::ContextId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Metadata key: epoch-ms when the instance parked at a pause state.
pub const PAUSED_AT_KEY: &str = "_pausedAt";
/// Metadata key: the state the instance parked at.
pub const PAUSED_STATE_KEY: &str = "_pausedState";
/// Metadata key: pause timeout in seconds (`-1` = infinite).
pub const PAUSE_TIMEOUT_KEY: &str = "_pauseTimeout";

/// Upper bound on the in-context event window; older events stay queryable
/// through the store's event history.
pub const RECENT_EVENTS_LIMIT: usize = 100;

/// Durable per-instance state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateContext {
    pub id: ContextId,
    #[serde(default)]
    pub current_state_id: Option<String>,
    pub created_at_ms: u64,
    pub last_updated_at_ms: u64,
    /// Handler-owned key/value state, merged from each `StateResult`.
    #[serde(default)]
    pub local_state: HashMap<String, Value>,
    /// Flow-wide constants; treated read-mostly.
    #[serde(default)]
    pub global_state: HashMap<String, Value>,
    /// Engine-owned metadata, including the reserved `_pause*` keys.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Bounded window of recently delivered events, oldest dropped.
    #[serde(default)]
    pub recent_events: VecDeque<Event>,
}

impl StateContext {
    /// Create a fresh context with empty state maps.
    pub fn new(id: impl Into<ContextId>, clock: &impl Clock) -> Self {
        Self::new_with_epoch_ms(id, clock.epoch_ms())
    }

    /// Create a context with an explicit creation timestamp (for replay).
    pub fn new_with_epoch_ms(id: impl Into<ContextId>, epoch_ms: u64) -> Self {
        Self {
            id: id.into(),
            current_state_id: None,
            created_at_ms: epoch_ms,
            last_updated_at_ms: epoch_ms,
            local_state: HashMap::new(),
            global_state: HashMap::new(),
            metadata: HashMap::new(),
            recent_events: VecDeque::new(),
        }
    }

    /// Seed the handler-owned local state.
    pub fn with_local_state(mut self, local_state: HashMap<String, Value>) -> Self {
        self.local_state = local_state;
        self
    }

    /// Set the current state id.
    pub fn with_current_state(mut self, state_id: impl Into<String>) -> Self {
        self.current_state_id = Some(state_id.into());
        self
    }

    /// Merge a handler result's data into local state (result keys win).
    pub fn merge_local(&mut self, data: HashMap<String, Value>) {
        self.local_state.extend(data);
    }

    /// Append an event to the bounded window, dropping the oldest entry
    /// once the window is full.
    pub fn record_event(&mut self, event: Event) {
        if self.recent_events.len() >= RECENT_EVENTS_LIMIT {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event);
    }

    /// Write the three reserved pause-marker keys.
    ///
    /// `timeout_secs` follows the state definition: `-1` means infinite,
    /// positive values expire, `None` is recorded as `-1` (no collection).
    pub fn mark_paused(&mut self, state_id: &str, timeout_secs: Option<i64>, now_ms: u64) {
        self.metadata
            .insert(PAUSED_AT_KEY.to_string(), Value::from(now_ms));
        self.metadata
            .insert(PAUSED_STATE_KEY.to_string(), Value::from(state_id));
        self.metadata.insert(
            PAUSE_TIMEOUT_KEY.to_string(),
            Value::from(timeout_secs.unwrap_or(-1)),
        );
        self.last_updated_at_ms = now_ms;
    }

    /// Remove the reserved pause-marker keys. Returns true if any was set.
    pub fn clear_pause_markers(&mut self) -> bool {
        let had = self.metadata.remove(PAUSED_AT_KEY).is_some();
        self.metadata.remove(PAUSED_STATE_KEY);
        self.metadata.remove(PAUSE_TIMEOUT_KEY);
        had
    }

    /// An instance is paused iff `_pausedAt` is present.
    pub fn is_paused(&self) -> bool {
        self.metadata.contains_key(PAUSED_AT_KEY)
    }

    /// Pause timestamp in epoch-ms, tolerating integer and floating-point
    /// representations (contexts written by other encoders may store floats).
    pub fn paused_at_ms(&self) -> Option<u64> {
        self.metadata.get(PAUSED_AT_KEY).and_then(as_millis)
    }

    /// State id the instance parked at.
    pub fn paused_state(&self) -> Option<&str> {
        self.metadata.get(PAUSED_STATE_KEY).and_then(Value::as_str)
    }

    /// Pause timeout in seconds; `-1` means infinite.
    pub fn pause_timeout_secs(&self) -> Option<i64> {
        self.metadata.get(PAUSE_TIMEOUT_KEY).and_then(as_secs)
    }
}

/// Decode an epoch-ms value stored as either integer or float.
fn as_millis(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value.as_f64().map(|f| f as u64)
}

/// Decode a seconds value stored as either integer or float.
fn as_secs(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value.as_f64().map(|f| f as i64)
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
