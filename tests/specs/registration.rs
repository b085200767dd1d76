//! Registration flow: durable pause at the verification state and resume
//! by external event.

use crate::prelude::*;
use rotor_core::FakeClock;
use rotor_engine::ExecuteOptions;
use serde_json::json;
use tempfile::tempdir;

#[tokio::test]
async fn instance_parks_at_verification_with_durable_markers() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(120, None),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine
        .start(None, [("phone".to_string(), json!("555-0100"))].into())
        .unwrap()
        .id
        .to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    // Parked at the verification state
    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("waiting_verification")
    );

    // The durable markers and the in-memory index agree
    let stored = engine.store().load_context(&id).unwrap();
    assert_eq!(stored.paused_state(), Some("waiting_verification"));
    assert_eq!(stored.pause_timeout_secs(), Some(120));
    assert!(stored.paused_at_ms().is_some());

    let paused = executor.paused_instances();
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0].context_id, id.as_str());
    assert_eq!(paused[0].state_id, "waiting_verification");

    // The store's paused query sees it too
    let from_store = engine.store().find_paused_instances();
    assert_eq!(from_store.len(), 1);
    assert_eq!(from_store[0], id.as_str());
}

#[tokio::test]
async fn correct_code_resumes_to_success() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(120, None),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    // External verification event with the right code
    let result = executor
        .trigger_event(
            &engine,
            &id,
            "verify",
            "verify",
            Some([("inputCode".to_string(), json!("123456"))].into()),
        )
        .await
        .unwrap();
    assert!(result.success);
    executor.remove_paused_instance(&id);
    executor.continue_execution(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("registration_success")
    );

    // Pause markers are gone from the durable context
    let stored = engine.store().load_context(&id).unwrap();
    assert!(!stored.is_paused());
    assert_eq!(stored.local_state.get("verified"), Some(&json!(true)));
    assert!(executor.paused_instances().is_empty());
}

#[tokio::test]
async fn wrong_code_fails_registration() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(120, None),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    let result = executor
        .trigger_event(
            &engine,
            &id,
            "verify",
            "verify",
            Some([("inputCode".to_string(), json!("000000"))].into()),
        )
        .await
        .unwrap();
    assert!(!result.success);

    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("registration_failed")
    );
    assert!(!engine.store().load_context(&id).unwrap().is_paused());
}

#[tokio::test]
async fn verification_event_lands_in_event_log() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(
        &registration_doc(120, None),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, Default::default()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

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

    let events = engine.store().get_event_history(&id);
    let verify_event = events.iter().find(|e| e.event_type.name == "verify").unwrap();
    assert_eq!(verify_event.payload.get("inputCode"), Some(&json!("123456")));

    // The context's bounded window saw it too
    let ctx = engine.context(&id).unwrap();
    assert!(ctx
        .recent_events
        .iter()
        .any(|e| e.event_type.name == "verify"));
}
