// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler bindings from the document's `functions` section.

use serde::{Deserialize, Serialize};

/// Binds a named handler to a state.
///
/// The handler itself lives in code; the binding names it and carries the
/// invocation metadata (priority for duplicate resolution, advisory timeout,
/// retry count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerBinding {
    pub state_id: String,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
    /// Advisory per-invocation deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}
