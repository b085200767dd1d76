// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::engine::Engine;
use crate::registry::{handler_fn, HandlerRegistry, StateHandler};
use rotor_core::{FakeClock, StateResult};
use rotor_flow::{parse_flow, FlowConfig};
use rotor_storage::ContextStore;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub(crate) const TRANSFER_FLOW: &str = r#"{
    "name": "transfer",
    "states": [
        {"id": "initiated", "isInitial": true},
        {"id": "validating_accounts"},
        {"id": "checking_balance"},
        {"id": "transferring"},
        {"id": "transfer_success", "type": "FINAL"},
        {"id": "transfer_failed", "type": "ERROR"}
    ],
    "transitions": [
        {"from": "initiated", "to": "validating_accounts"},
        {"from": "validating_accounts", "to": "checking_balance"},
        {"from": "validating_accounts", "to": "transfer_failed", "condition": "Failure"},
        {"from": "checking_balance", "to": "transferring"},
        {"from": "checking_balance", "to": "transfer_failed", "condition": "Failure"},
        {"from": "transferring", "to": "transfer_success"},
        {"from": "transferring", "to": "transfer_failed", "condition": "Failure"}
    ]
}"#;

pub(crate) fn transfer_flow() -> FlowConfig {
    parse_flow(TRANSFER_FLOW).unwrap()
}

/// Registration flow with a pause-on-enter verification state.
///
/// `timeout_action` is spliced in as raw JSON when given.
pub(crate) fn registration_flow(timeout: i64, timeout_action: Option<&str>) -> FlowConfig {
    let action = timeout_action
        .map(|a| format!(r#", "timeoutAction": {a}"#))
        .unwrap_or_default();
    let doc = format!(
        r#"{{
            "name": "registration",
            "states": [
                {{"id": "submitted", "isInitial": true}},
                {{"id": "waiting_verification", "pauseOnEnter": true, "timeout": {timeout}{action}}},
                {{"id": "registration_success", "type": "FINAL"}},
                {{"id": "registration_failed", "type": "ERROR"}}
            ],
            "transitions": [
                {{"from": "submitted", "to": "waiting_verification"}},
                {{"from": "waiting_verification", "to": "registration_success"}},
                {{"from": "waiting_verification", "to": "registration_failed", "condition": "Failure"}}
            ]
        }}"#
    );
    parse_flow(&doc).unwrap()
}

/// Handler returning success with fixed data entries.
pub(crate) fn ok_handler(entries: &[(&str, Value)]) -> Arc<dyn StateHandler> {
    let data: HashMap<String, Value> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    handler_fn(move |_ctx| {
        let data = data.clone();
        async move { Ok(StateResult::ok_with(data)) }
    })
}

/// Handler returning a failing result.
pub(crate) fn fail_handler(error: &str) -> Arc<dyn StateHandler> {
    let error = error.to_string();
    handler_fn(move |_ctx| {
        let error = error.clone();
        async move { Ok(StateResult::fail(error)) }
    })
}

/// Build an engine over a fresh store in `dir`.
pub(crate) fn engine_with(
    flow: FlowConfig,
    registry: Arc<HandlerRegistry>,
    dir: &Path,
    clock: FakeClock,
) -> Arc<Engine<FakeClock>> {
    let store = Arc::new(ContextStore::open(dir).unwrap());
    Arc::new(Engine::new(flow, store, registry, clock))
}
