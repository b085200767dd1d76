// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::{handler_fn, HandlerError};
use crate::test_helpers::{fail_handler, ok_handler, registration_flow, transfer_flow};
use rotor_core::StateContext;
use rotor_flow::parse_flow;
use serde_json::json;

fn machine(flow: rotor_flow::FlowConfig, registry: Arc<HandlerRegistry>) -> StateMachine {
    StateMachine::new(Arc::new(flow), registry)
}

fn started(machine: &StateMachine, id: &str) -> StateContext {
    machine.start(StateContext::new_with_epoch_ms(id, 1_000))
}

#[test]
fn start_places_instance_at_initial_state() {
    let m = machine(transfer_flow(), Arc::new(HandlerRegistry::new()));
    let ctx = started(&m, "i1");
    assert_eq!(ctx.current_state_id.as_deref(), Some("initiated"));
    assert_eq!(m.current_state("i1").as_deref(), Some("initiated"));
}

#[test]
fn start_is_idempotent_for_known_ids() {
    let m = machine(transfer_flow(), Arc::new(HandlerRegistry::new()));
    started(&m, "i1");

    // Second start with a context pointing elsewhere returns the existing view
    let other = StateContext::new_with_epoch_ms("i1", 9_000).with_current_state("transferring");
    let ctx = m.start(other);
    assert_eq!(ctx.current_state_id.as_deref(), Some("initiated"));
}

#[test]
fn start_respects_persisted_current_state() {
    let m = machine(transfer_flow(), Arc::new(HandlerRegistry::new()));
    let ctx = m.start(
        StateContext::new_with_epoch_ms("i1", 1_000).with_current_state("checking_balance"),
    );
    assert_eq!(ctx.current_state_id.as_deref(), Some("checking_balance"));
}

#[test]
fn restore_requires_current_state() {
    let m = machine(transfer_flow(), Arc::new(HandlerRegistry::new()));

    let bare = StateContext::new_with_epoch_ms("i1", 1_000);
    assert!(matches!(
        m.restore(bare),
        Err(StateError::NoCurrentState(_))
    ));

    let ok = StateContext::new_with_epoch_ms("i2", 1_000).with_current_state("transferring");
    m.restore(ok).unwrap();
    assert_eq!(m.current_state("i2").as_deref(), Some("transferring"));
}

#[tokio::test]
async fn process_event_advances_on_success_edge() {
    let registry = Arc::new(HandlerRegistry::new());
    let m = machine(transfer_flow(), Arc::clone(&registry));
    started(&m, "i1");

    let event = rotor_core::Event::new("ev-1", "process", "process", 2_000);
    let outcome = m.process_event("i1", &event, 2_000).await.unwrap();

    assert_eq!(outcome.from, "initiated");
    assert_eq!(outcome.to.as_deref(), Some("validating_accounts"));
    assert!(outcome.result.success);
    assert_eq!(m.current_state("i1").as_deref(), Some("validating_accounts"));
    assert_eq!(outcome.context.last_updated_at_ms, 2_000);
}

#[tokio::test]
async fn failing_handler_takes_failure_edge() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("validating_accounts", fail_handler("account frozen"));
    let m = machine(transfer_flow(), Arc::clone(&registry));
    m.start(
        StateContext::new_with_epoch_ms("i1", 1_000).with_current_state("validating_accounts"),
    );

    let event = rotor_core::Event::new("ev-1", "process", "process", 2_000);
    let outcome = m.process_event("i1", &event, 2_000).await.unwrap();

    assert!(!outcome.result.success);
    assert_eq!(outcome.to.as_deref(), Some("transfer_failed"));
}

#[tokio::test]
async fn handler_exception_still_selects_failure_edge() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(
        "validating_accounts",
        handler_fn(|_ctx| async move { Err(HandlerError::from("panic equivalent")) }),
    );
    let m = machine(transfer_flow(), Arc::clone(&registry));
    m.start(
        StateContext::new_with_epoch_ms("i1", 1_000).with_current_state("validating_accounts"),
    );

    let event = rotor_core::Event::new("ev-1", "process", "process", 2_000);
    let outcome = m.process_event("i1", &event, 2_000).await.unwrap();
    assert_eq!(outcome.to.as_deref(), Some("transfer_failed"));
    assert_eq!(outcome.result.error.as_deref(), Some("panic equivalent"));
}

#[tokio::test]
async fn result_data_merges_into_local_state() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register("initiated", ok_handler(&[("transferId", json!("t-42"))]));
    let m = machine(transfer_flow(), Arc::clone(&registry));
    let mut seed = StateContext::new_with_epoch_ms("i1", 1_000);
    seed.local_state.insert("amount".into(), json!(200));
    m.start(seed);

    let event = rotor_core::Event::new("ev-1", "process", "process", 2_000);
    let outcome = m.process_event("i1", &event, 2_000).await.unwrap();

    assert_eq!(outcome.context.local_state.get("amount"), Some(&json!(200)));
    assert_eq!(
        outcome.context.local_state.get("transferId"),
        Some(&json!("t-42"))
    );
}

#[tokio::test]
async fn event_is_recorded_before_handler_runs() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(
        "initiated",
        handler_fn(|ctx| async move {
            // The triggering event is visible as the latest window entry
            let payload = ctx
                .recent_events
                .back()
                .and_then(|e| e.payload.get("code").cloned());
            match payload {
                Some(v) => Ok(StateResult::ok().with_entry("seen", v)),
                None => Err(HandlerError::from("no event visible")),
            }
        }),
    );
    let m = machine(transfer_flow(), Arc::clone(&registry));
    started(&m, "i1");

    let event = rotor_core::Event::new("ev-1", "verify", "verify", 2_000)
        .with_payload([("code".to_string(), json!("123456"))].into());
    let outcome = m.process_event("i1", &event, 2_000).await.unwrap();

    assert!(outcome.result.success);
    assert_eq!(outcome.context.local_state.get("seen"), Some(&json!("123456")));
    assert_eq!(outcome.context.recent_events.len(), 1);
}

#[tokio::test]
async fn no_matching_edge_stays_put() {
    let registry = Arc::new(HandlerRegistry::new());
    // transfer_success has no outgoing edges
    let m = machine(transfer_flow(), Arc::clone(&registry));
    m.start(StateContext::new_with_epoch_ms("i1", 1_000).with_current_state("transfer_success"));

    let event = rotor_core::Event::new("ev-1", "process", "process", 2_000);
    let outcome = m.process_event("i1", &event, 2_000).await.unwrap();
    assert_eq!(outcome.to, None);
    assert_eq!(m.current_state("i1").as_deref(), Some("transfer_success"));
}

#[tokio::test]
async fn process_event_unknown_instance_fails_fast() {
    let m = machine(transfer_flow(), Arc::new(HandlerRegistry::new()));
    let event = rotor_core::Event::new("ev-1", "process", "process", 2_000);
    assert!(matches!(
        m.process_event("ghost", &event, 2_000).await,
        Err(StateError::UnknownInstance(_))
    ));
}

#[tokio::test]
async fn process_clears_pause_markers() {
    let registry = Arc::new(HandlerRegistry::new());
    let m = machine(registration_flow(60, None), Arc::clone(&registry));
    started(&m, "i1");
    m.mark_paused("i1", Some(60), 2_000).unwrap();
    assert!(m.context("i1").unwrap().is_paused());

    let event = rotor_core::Event::new("ev-1", "verify", "verify", 3_000);
    let outcome = m.process_event("i1", &event, 3_000).await.unwrap();
    assert!(!outcome.context.is_paused());
}

#[test]
fn find_next_state_honours_priority_and_document_order() {
    let flow = parse_flow(
        r#"{
            "name": "routing",
            "states": [
                {"id": "start", "isInitial": true},
                {"id": "low"}, {"id": "high"}, {"id": "tie"}
            ],
            "transitions": [
                {"from": "start", "to": "low", "priority": 1},
                {"from": "start", "to": "high", "priority": 9},
                {"from": "start", "to": "tie", "priority": 9}
            ]
        }"#,
    )
    .unwrap();
    let m = machine(flow, Arc::new(HandlerRegistry::new()));

    // Highest priority wins; the 9-9 tie keeps document order
    assert_eq!(
        m.find_next_state("start", &StateResult::ok()).as_deref(),
        Some("high")
    );
}

#[test]
fn find_next_state_custom_condition() {
    let flow = parse_flow(
        r#"{
            "name": "routing",
            "states": [
                {"id": "start", "isInitial": true},
                {"id": "vip"}, {"id": "normal"}
            ],
            "transitions": [
                {"from": "start", "to": "vip", "condition": "is_vip", "priority": 10},
                {"from": "start", "to": "normal", "priority": 1}
            ]
        }"#,
    )
    .unwrap();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_condition("is_vip", |r| {
        r.data.get("vip").and_then(|v| v.as_bool()).unwrap_or(false)
    });
    let m = machine(flow, registry);

    let vip = StateResult::ok().with_entry("vip", true);
    assert_eq!(m.find_next_state("start", &vip).as_deref(), Some("vip"));

    let plain = StateResult::ok();
    assert_eq!(m.find_next_state("start", &plain).as_deref(), Some("normal"));
}

#[test]
fn force_transition_skips_handler_and_keeps_local_state() {
    let registry = Arc::new(HandlerRegistry::new());
    // A handler that would overwrite local state if it ran
    registry.register("transferring", ok_handler(&[("ran", json!(true))]));
    let m = machine(transfer_flow(), Arc::clone(&registry));
    let mut seed = StateContext::new_with_epoch_ms("i1", 1_000);
    seed.local_state.insert("amount".into(), json!(200));
    m.start(seed);

    let outcome = m
        .force_transition("i1", "transferring", "operator", 2_000)
        .unwrap();

    assert_eq!(outcome.from, "initiated");
    assert_eq!(m.current_state("i1").as_deref(), Some("transferring"));
    let ctx = m.context("i1").unwrap();
    assert_eq!(ctx.local_state.get("amount"), Some(&json!(200)));
    assert!(!ctx.local_state.contains_key("ran"));
}

#[test]
fn force_transition_validates_target() {
    let m = machine(transfer_flow(), Arc::new(HandlerRegistry::new()));
    started(&m, "i1");
    assert!(matches!(
        m.force_transition("i1", "nowhere", "timeout", 2_000),
        Err(StateError::UnknownTarget { .. })
    ));
}

#[test]
fn force_transition_clears_pause_markers() {
    let m = machine(registration_flow(60, None), Arc::new(HandlerRegistry::new()));
    started(&m, "i1");
    m.mark_paused("i1", Some(60), 2_000).unwrap();

    m.force_transition("i1", "registration_failed", "timeout", 3_000)
        .unwrap();
    assert!(!m.context("i1").unwrap().is_paused());
}

#[test]
fn evict_forgets_instance() {
    let m = machine(transfer_flow(), Arc::new(HandlerRegistry::new()));
    started(&m, "i1");
    assert!(m.contains("i1"));
    m.evict("i1");
    assert!(!m.contains("i1"));
    assert!(m.current_state("i1").is_none());
}
