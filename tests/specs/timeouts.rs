//! Pause timeouts: forced transitions and synthesized events.

use crate::prelude::*;
use rotor_core::FakeClock;
use rotor_engine::ExecuteOptions;
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

const TRANSITION_ACTION: &str = r#"{"type": "transition", "targetState": "registration_failed"}"#;
const EVENT_ACTION: &str = r#"{"type": "event", "eventType": "timeout", "eventName": "timeout"}"#;

#[tokio::test]
async fn expired_pause_forces_configured_transition() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(2, Some(TRANSITION_ACTION)),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    clock.advance(Duration::from_secs(3));
    assert_eq!(executor.sweep_expired().await.unwrap(), 1);

    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("registration_failed")
    );
    assert!(executor.paused_instances().is_empty());
    assert!(!engine.store().load_context(&id).unwrap().is_paused());

    // The forced transition left a history row without an event id
    let last = engine.store().get_state_history(&id).pop().unwrap();
    assert_eq!(last.to_state_id, "registration_failed");
    assert!(last.event_id.is_none());
}

#[tokio::test]
async fn timeout_fires_exactly_once() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(2, Some(TRANSITION_ACTION)),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    clock.advance(Duration::from_secs(10));
    assert_eq!(executor.sweep_expired().await.unwrap(), 1);
    let history_len = engine.store().get_state_history(&id).len();

    // Further sweeps find nothing: the marker was cleared first
    assert_eq!(executor.sweep_expired().await.unwrap(), 0);
    clock.advance(Duration::from_secs(10));
    assert_eq!(executor.sweep_expired().await.unwrap(), 0);
    assert_eq!(engine.store().get_state_history(&id).len(), history_len);
}

#[tokio::test]
async fn expired_pause_emits_configured_event() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(2, Some(EVENT_ACTION)),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    clock.advance(Duration::from_secs(3));
    executor.sweep_expired().await.unwrap();

    // One timeout event with the marker payload reached the event log
    let events = engine.store().get_event_history(&id);
    let timeout_events: Vec<_> = events
        .iter()
        .filter(|e| e.event_type.name == "timeout")
        .collect();
    assert_eq!(timeout_events.len(), 1);
    assert_eq!(timeout_events[0].payload.get("timeout"), Some(&json!(true)));

    // The verification handler treated it as a failure and the flow's
    // failure edge was taken
    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("registration_failed")
    );
    assert!(!engine.store().load_context(&id).unwrap().is_paused());
}

#[tokio::test]
async fn pause_without_positive_timeout_is_never_collected() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(-1, Some(TRANSITION_ACTION)),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    clock.advance(Duration::from_secs(100_000));
    assert_eq!(executor.sweep_expired().await.unwrap(), 0);
    assert_eq!(executor.paused_instances().len(), 1);
    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("waiting_verification")
    );
}

#[tokio::test]
async fn resume_before_timeout_wins() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(60, Some(TRANSITION_ACTION)),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    // Verify while the pause is still fresh
    clock.advance(Duration::from_secs(10));
    executor
        .trigger_event(
            &engine,
            &id,
            "verify",
            "verify",
            Some([("inputCode".to_string(), json!("123456"))].into()),
        )
        .await
        .unwrap();
    executor.remove_paused_instance(&id);

    // The timeout deadline passing later finds nothing to expire
    clock.advance(Duration::from_secs(100));
    assert_eq!(executor.sweep_expired().await.unwrap(), 0);
    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("registration_success")
    );
}
