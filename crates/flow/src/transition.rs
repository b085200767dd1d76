// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition definitions

use rotor_core::StateResult;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Condition on an edge out of a state.
///
/// In the document this is a plain string: `Success` and `Failure` map to
/// the built-in conditions, any other string names a custom predicate
/// registered in code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransitionCondition {
    #[default]
    Success,
    Failure,
    Custom(String),
}

impl TransitionCondition {
    /// Evaluate a built-in condition against a handler result.
    ///
    /// Returns `None` for custom conditions, which are resolved against the
    /// predicates registered with the handler registry.
    pub fn matches_builtin(&self, result: &StateResult) -> Option<bool> {
        match self {
            TransitionCondition::Success => Some(result.success),
            TransitionCondition::Failure => Some(!result.success),
            TransitionCondition::Custom(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransitionCondition::Success => "Success",
            TransitionCondition::Failure => "Failure",
            TransitionCondition::Custom(name) => name,
        }
    }
}

impl Serialize for TransitionCondition {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransitionCondition {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(match raw.as_str() {
            "Success" => TransitionCondition::Success,
            "Failure" => TransitionCondition::Failure,
            _ => TransitionCondition::Custom(raw),
        })
    }
}

/// A directed edge between two states.
///
/// Within a `from` state, edges are tried in descending priority; document
/// order breaks ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDef {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: TransitionCondition,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
#[path = "transition_tests.rs"]
mod tests;
