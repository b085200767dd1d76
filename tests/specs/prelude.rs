//! Shared fixtures: flow documents, handler tables, engine builders.

use rotor_core::{FakeClock, StateResult};
use rotor_engine::{handler_fn, Engine, ExecutorConfig, HandlerRegistry, HandlerTable, WorkflowExecutor};
use rotor_flow::parse_flow;
use rotor_storage::ContextStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const TRANSFER_FLOW: &str = r#"{
    "name": "transfer",
    "description": "money transfer between accounts",
    "version": "1.0",
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
    ],
    "functions": [
        {"stateId": "initiated", "functionName": "initiate_transfer"},
        {"stateId": "validating_accounts", "functionName": "validate_accounts"},
        {"stateId": "checking_balance", "functionName": "check_balance"},
        {"stateId": "transferring", "functionName": "execute_transfer"}
    ]
}"#;

/// Registration flow; timeout and action on the verification state are
/// spliced in per scenario.
pub fn registration_doc(timeout: i64, timeout_action: Option<&str>) -> String {
    let action = timeout_action
        .map(|a| format!(r#", "timeoutAction": {a}"#))
        .unwrap_or_default();
    format!(
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
            ],
            "functions": [
                {{"stateId": "submitted", "functionName": "accept_submission"}},
                {{"stateId": "waiting_verification", "functionName": "verify_code"}}
            ]
        }}"#
    )
}

/// Handler table for the transfer flow. Balance is fixed at 500: transfers
/// above it fail the balance check.
pub fn transfer_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.insert(
        "initiate_transfer".to_string(),
        handler_fn(|_ctx| async move { Ok(StateResult::ok().with_entry("initiatedAt", "now")) }),
    );
    table.insert(
        "validate_accounts".to_string(),
        handler_fn(|ctx| async move {
            let has = |k: &str| ctx.local_state.get(k).and_then(Value::as_str).is_some();
            if has("fromUserId") && has("toUserId") {
                Ok(StateResult::ok().with_entry("accountsValid", true))
            } else {
                Ok(StateResult::fail("missing account ids"))
            }
        }),
    );
    table.insert(
        "check_balance".to_string(),
        handler_fn(|ctx| async move {
            let amount = ctx
                .local_state
                .get("amount")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if amount <= 500 {
                Ok(StateResult::ok().with_entry("balance", 500 - amount))
            } else {
                Ok(StateResult::fail("insufficient balance"))
            }
        }),
    );
    table.insert(
        "execute_transfer".to_string(),
        handler_fn(|ctx| async move {
            let amount = ctx
                .local_state
                .get("amount")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Ok(StateResult::ok()
                .with_entry("transferId", format!("tx-{amount}"))
                .with_entry("completed", true))
        }),
    );
    table
}

/// Handler table for the registration flow. The verification handler reads
/// the triggering event: a timeout-born event fails, the code "123456"
/// succeeds, anything else fails.
pub fn registration_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.insert(
        "accept_submission".to_string(),
        handler_fn(|_ctx| async move { Ok(StateResult::ok().with_entry("submitted", true)) }),
    );
    table.insert(
        "verify_code".to_string(),
        handler_fn(|ctx| async move {
            let event = ctx.recent_events.back();
            let timed_out = event
                .and_then(|e| e.payload.get("timeout"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if timed_out {
                return Ok(StateResult::fail("verification window elapsed"));
            }
            let code = event
                .and_then(|e| e.payload.get("inputCode"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if code == "123456" {
                Ok(StateResult::ok().with_entry("verified", true))
            } else {
                Ok(StateResult::fail("wrong verification code"))
            }
        }),
    );
    table
}

/// Build an engine from a flow document string + handler table, over a
/// store in `dir`, on a fake clock.
pub fn build_engine(
    doc: &str,
    handlers: HandlerTable,
    dir: &Path,
    clock: FakeClock,
) -> Arc<Engine<FakeClock>> {
    let flow = parse_flow(doc).unwrap();
    let registry = Arc::new(HandlerRegistry::new());
    registry.bind(&flow.bindings, &handlers);
    let store = Arc::new(ContextStore::open(dir).unwrap());
    Arc::new(Engine::new(flow, store, registry, clock))
}

/// Executor with test-friendly cadence.
pub fn build_executor(clock: &FakeClock) -> Arc<WorkflowExecutor<FakeClock>> {
    WorkflowExecutor::new(
        clock.clone(),
        ExecutorConfig {
            tick: Duration::from_millis(20),
            error_backoff: Duration::from_millis(20),
            step_delay: Duration::from_millis(1),
        },
    )
}

/// Wait for the instance's driver task to finish (bounded).
pub async fn wait_idle(executor: &WorkflowExecutor<FakeClock>, id: &str) {
    for _ in 0..500 {
        if !executor.is_running(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("driver for {id} did not finish");
}

/// Seed local state for a 200-unit transfer between two accounts.
pub fn transfer_seed() -> HashMap<String, Value> {
    [
        ("fromUserId".to_string(), json!("A")),
        ("toUserId".to_string(), json!("B")),
        ("amount".to_string(), json!(200)),
    ]
    .into()
}
