// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow document validation.

use crate::config::FlowConfig;
use crate::parser::FlowDocument;
use crate::state::TimeoutAction;
use crate::transition::TransitionDef;
use indexmap::IndexMap;
use std::collections::HashMap;
use thiserror::Error;

/// Fatal configuration errors raised while building a [`FlowConfig`].
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("flow '{flow}' defines no states")]
    NoStates { flow: String },

    #[error("flow '{flow}' has no initial state (flag one with isInitial or type INITIAL)")]
    NoInitialState { flow: String },

    #[error("duplicate state id '{id}'")]
    DuplicateState { id: String },

    #[error("state id must not be empty (state #{index})")]
    EmptyStateId { index: usize },

    #[error("transition {from} -> {to} references unknown '{side}' state; available states: {available}")]
    UnknownTransitionState {
        from: String,
        to: String,
        side: &'static str,
        available: String,
    },
}

/// Build a validated [`FlowConfig`] from a parsed document.
///
/// Fatal errors abort the load; non-fatal findings (a timeout action whose
/// target does not exist) are collected into `warnings` so the runtime can
/// log the misconfiguration when the timeout actually fires.
pub(crate) fn build_config(doc: FlowDocument) -> Result<FlowConfig, ValidateError> {
    if doc.states.is_empty() {
        return Err(ValidateError::NoStates { flow: doc.name });
    }

    let mut states: IndexMap<String, _> = IndexMap::with_capacity(doc.states.len());
    for (index, state) in doc.states.into_iter().enumerate() {
        if state.id.is_empty() {
            return Err(ValidateError::EmptyStateId { index });
        }
        if states.contains_key(&state.id) {
            return Err(ValidateError::DuplicateState { id: state.id });
        }
        states.insert(state.id.clone(), state);
    }

    // First state in document order flagged initial wins the tie-break.
    let initial_id = states
        .values()
        .find(|s| s.is_initial_state())
        .map(|s| s.id.clone())
        .ok_or(ValidateError::NoInitialState {
            flow: doc.name.clone(),
        })?;

    for t in &doc.transitions {
        for (side, id) in [("from", &t.from), ("to", &t.to)] {
            if !states.contains_key(id.as_str()) {
                return Err(ValidateError::UnknownTransitionState {
                    from: t.from.clone(),
                    to: t.to.clone(),
                    side,
                    available: sorted_ids(&states),
                });
            }
        }
    }

    let mut warnings = Vec::new();
    for state in states.values() {
        if let Some(TimeoutAction::Transition { target_state }) = &state.timeout_action {
            if !states.contains_key(target_state.as_str()) {
                warnings.push(format!(
                    "state '{}' timeout action targets unknown state '{}'",
                    state.id, target_state
                ));
            }
        }
    }

    // Group per from-state; stable sort keeps document order on equal priority.
    let mut transitions: HashMap<String, Vec<TransitionDef>> = HashMap::new();
    for t in doc.transitions {
        transitions.entry(t.from.clone()).or_default().push(t);
    }
    for edges in transitions.values_mut() {
        edges.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    Ok(FlowConfig {
        name: doc.name,
        description: doc.description,
        version: doc.version,
        author: doc.author,
        pauseable: doc.pauseable.unwrap_or(true),
        default_timeout: doc.default_timeout,
        auto_resume: doc.auto_resume,
        states,
        transitions,
        initial_id,
        bindings: doc.functions,
        metadata: doc.metadata,
        warnings,
    })
}

fn sorted_ids(states: &IndexMap<String, crate::state::StateDef>) -> String {
    let mut ids: Vec<&str> = states.keys().map(String::as_str).collect();
    ids.sort_unstable();
    ids.join(", ")
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
