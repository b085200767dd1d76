// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of one handler invocation.
///
/// `success` drives transition selection; `data` is merged into the
/// instance's local state before the next edge is picked.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateResult {
    pub success: bool,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StateResult {
    /// Successful result with no data.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: HashMap::new(),
            error: None,
        }
    }

    /// Successful result carrying data to merge into local state.
    pub fn ok_with(data: HashMap<String, Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Failed result with an error message.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: HashMap::new(),
            error: Some(error.into()),
        }
    }

    /// Insert a single data entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
