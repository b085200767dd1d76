// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State definitions

use serde::{Deserialize, Serialize};

/// Id substrings that classify a state as terminal regardless of its type.
pub const TERMINAL_MARKERS: [&str; 4] = ["success", "completed", "failed", "error"];

/// Classification of a state within a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateType {
    Initial,
    #[default]
    Normal,
    Final,
    Error,
}

/// What the engine does when a paused instance outlives its timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimeoutAction {
    /// Force the instance into the target state without running its handler.
    #[serde(rename = "transition")]
    Transition {
        #[serde(rename = "targetState")]
        target_state: String,
    },
    /// Synthesize an event and feed it through the normal process step.
    #[serde(rename = "event")]
    Event {
        #[serde(rename = "eventType")]
        event_type: String,
        #[serde(rename = "eventName")]
        event_name: String,
    },
}

/// A state within a flow definition.
///
/// `timeout` semantics: absent = inherit the flow default, `-1` = infinite,
/// `0` = no timeout, positive = seconds until the pause expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub state_type: StateType,
    /// Parent state for hierarchy display; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_error: bool,
    /// Per-state override of the flow's pauseable default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pauseable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub pause_on_enter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_action: Option<TimeoutAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StateDef {
    /// Whether this state can start a flow (flag or type).
    pub fn is_initial_state(&self) -> bool {
        self.is_initial || self.state_type == StateType::Initial
    }

    /// Terminal policy: Final/Error by type or flag, or an id carrying one
    /// of the terminal marker substrings.
    pub fn is_terminal(&self) -> bool {
        if self.is_final
            || self.is_error
            || matches!(self.state_type, StateType::Final | StateType::Error)
        {
            return true;
        }
        TERMINAL_MARKERS.iter().any(|m| self.id.contains(m))
    }

    /// Resolve the pause timeout against the flow default.
    ///
    /// Returns `None` when no timeout applies, `Some(-1)` for an infinite
    /// pause, `Some(t)` for a deadline of `t` seconds.
    pub fn effective_timeout(&self, flow_default: Option<i64>) -> Option<i64> {
        let raw = self.timeout.or(flow_default)?;
        if raw == 0 {
            None
        } else {
            Some(raw)
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
