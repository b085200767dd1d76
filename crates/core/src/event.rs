// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events fed into workflow instances.
//!
//! Events are inputs to `process`: they carry no ownership of a context.
//! The engine records each event durably before the step it triggers, and
//! every context keeps a bounded window of the events it has seen.

use crate::id::EventId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Event type triple: namespace, name, version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl EventType {
    /// An event type in the engine's own namespace, version 1.0.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new("rotor", name, "1.0")
    }

    /// A fully qualified event type.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.namespace, self.name, self.version)
    }
}

/// Event priority ordering. Priority does not affect step execution order
/// within an instance (steps are strictly serialized); it is carried for
/// consumers of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// An event delivered to a workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub priority: EventPriority,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Event {
    /// Create an event with the given id, type name, display name, and timestamp.
    pub fn new(
        id: impl Into<EventId>,
        type_name: impl Into<String>,
        name: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: EventType::named(type_name),
            name: name.into(),
            description: String::new(),
            timestamp_ms,
            source: String::new(),
            priority: EventPriority::Normal,
            payload: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a payload map.
    pub fn with_payload(mut self, payload: HashMap<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Set the emitting source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Synthesize the event produced when a paused instance outlives its
    /// timeout and the state's timeout action emits an event. The payload
    /// marks the event as timeout-born so handlers can distinguish it from
    /// an external submission.
    pub fn timeout(
        id: impl Into<EventId>,
        type_name: impl Into<String>,
        name: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        let mut payload = HashMap::new();
        payload.insert("timeout".to_string(), Value::Bool(true));
        Self::new(id, type_name, name, timestamp_ms)
            .with_source("timeout-monitor")
            .with_priority(EventPriority::High)
            .with_payload(payload)
    }

    /// One-line summary for log spans.
    pub fn log_summary(&self) -> String {
        format!("{} ({})", self.name, self.event_type)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
