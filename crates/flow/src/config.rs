// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated flow configuration.

use crate::binding::HandlerBinding;
use crate::state::{StateDef, TERMINAL_MARKERS};
use crate::transition::TransitionDef;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// A validated, immutable flow definition.
///
/// Built by the parser from a declarative document; states keep document
/// order, transitions are grouped per `from` state and pre-sorted by
/// descending priority (stable, so document order breaks ties).
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    /// Default pauseability for states that do not override it.
    pub pauseable: bool,
    /// Flow-wide pause timeout applied when a state has none.
    pub default_timeout: Option<i64>,
    /// Whether restored instances should resume running without an
    /// external event. Carried for the facade; the core never auto-drives.
    pub auto_resume: bool,
    pub(crate) states: IndexMap<String, StateDef>,
    pub(crate) transitions: HashMap<String, Vec<TransitionDef>>,
    pub(crate) initial_id: String,
    pub bindings: Vec<HandlerBinding>,
    pub metadata: HashMap<String, Value>,
    /// Non-fatal findings collected during validation.
    pub warnings: Vec<String>,
}

impl FlowConfig {
    /// The designated initial state.
    pub fn initial_state(&self) -> &StateDef {
        // Validation guarantees the id resolves; fall back to the first
        // state so a hand-built config cannot panic.
        self.states
            .get(&self.initial_id)
            .or_else(|| self.states.values().next())
            .unwrap_or_else(|| unreachable!("validated flow has at least one state"))
    }

    /// Look up a state definition.
    pub fn get_state(&self, id: &str) -> Option<&StateDef> {
        self.states.get(id)
    }

    /// All states in document order.
    pub fn states(&self) -> impl Iterator<Item = &StateDef> {
        self.states.values()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Outgoing edges of a state, highest priority first.
    pub fn transitions_from(&self, state_id: &str) -> &[TransitionDef] {
        self.transitions
            .get(state_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any state parks instances on entry.
    pub fn has_pause_states(&self) -> bool {
        self.states.values().any(|s| s.pause_on_enter)
    }

    /// Terminal policy over a state id: the definition's type/flags when the
    /// id is known, the marker substrings either way.
    pub fn is_terminal_state(&self, state_id: &str) -> bool {
        match self.states.get(state_id) {
            Some(def) => def.is_terminal(),
            None => TERMINAL_MARKERS.iter().any(|m| state_id.contains(m)),
        }
    }

    /// Effective pause timeout for a state (state override, then flow default).
    pub fn pause_timeout_for(&self, state_id: &str) -> Option<i64> {
        self.get_state(state_id)
            .and_then(|s| s.effective_timeout(self.default_timeout))
    }

    /// Whether a state may pause (state override, then flow default).
    pub fn is_pauseable(&self, state_id: &str) -> bool {
        self.get_state(state_id)
            .and_then(|s| s.pauseable)
            .unwrap_or(self.pauseable)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
