// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State transition history records.

use crate::id::{ContextId, EventId};
use serde::{Deserialize, Serialize};

/// One append-only row of an instance's transition history.
///
/// `from_state_id` is absent for the initial placement; `event_id` is absent
/// for forced transitions, which run without an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub context_id: ContextId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state_id: Option<String>,
    pub to_state_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    pub timestamp_ms: u64,
}

impl StateHistoryEntry {
    pub fn new(
        context_id: impl Into<ContextId>,
        from_state_id: Option<String>,
        to_state_id: impl Into<String>,
        event_id: Option<EventId>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            from_state_id,
            to_state_id: to_state_id.into(),
            event_id,
            timestamp_ms,
        }
    }
}
