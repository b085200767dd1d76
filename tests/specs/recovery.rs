//! Restart recovery: paused instances survive a process exit and resume.

use crate::prelude::*;
use rotor_core::FakeClock;
use rotor_engine::ExecuteOptions;
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

const TRANSITION_ACTION: &str = r#"{"type": "transition", "targetState": "registration_failed"}"#;

#[tokio::test]
async fn paused_instance_survives_restart_and_resumes() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();

    // First process lifetime: start, park, close
    let id = {
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
        engine.close().unwrap();
        id
    };

    // Second process lifetime: fresh engine + executor over the same store
    let engine = build_engine(
        &registration_doc(120, None),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let restored = executor.restore_paused_instances(&engine, &[]).await;
    assert_eq!(restored, 1);

    let paused = executor.paused_instances();
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0].context_id, id.as_str());
    assert_eq!(paused[0].state_id, "waiting_verification");

    // Local state survived the restart
    let ctx = engine.context(&id).unwrap();
    assert_eq!(ctx.local_state.get("phone"), Some(&json!("555-0100")));

    // Resume works as if the process had never exited
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
    assert!(!engine.store().load_context(&id).unwrap().is_paused());
}

#[tokio::test]
async fn restore_by_explicit_id_list() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();

    let (id_a, id_b) = {
        let engine = build_engine(
            &registration_doc(120, None),
            registration_handlers(),
            dir.path(),
            clock.clone(),
        );
        let executor = build_executor(&clock);
        executor.register_engine(engine.clone(), None);

        let id_a = engine.start(None, Default::default()).unwrap().id.to_string();
        let id_b = engine.start(None, Default::default()).unwrap().id.to_string();
        executor.execute_async(&engine, &id_a, ExecuteOptions::default());
        executor.execute_async(&engine, &id_b, ExecuteOptions::default());
        wait_idle(&executor, &id_a).await;
        wait_idle(&executor, &id_b).await;
        engine.close().unwrap();
        (id_a, id_b)
    };

    let engine = build_engine(
        &registration_doc(120, None),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    // Only the named instance is restored
    let restored = executor
        .restore_paused_instances(&engine, &[id_a.clone()])
        .await;
    assert_eq!(restored, 1);
    assert_eq!(executor.paused_instances()[0].context_id, id_a.as_str());
    assert!(executor
        .paused_instances()
        .iter()
        .all(|p| p.context_id != id_b.as_str()));
}

#[tokio::test]
async fn pause_expired_during_downtime_is_handled_on_restore() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();

    let id = {
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
        engine.close().unwrap();
        id
    };

    // The process stays down past the deadline
    clock.advance(Duration::from_secs(30));

    let engine = build_engine(
        &registration_doc(2, Some(TRANSITION_ACTION)),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);
    executor.restore_paused_instances(&engine, &[]).await;

    // Handled before restore returned: transitioned, index empty, markers gone
    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("registration_failed")
    );
    assert!(executor.paused_instances().is_empty());
    assert!(!engine.store().load_context(&id).unwrap().is_paused());
}

#[tokio::test]
async fn terminal_instances_are_not_restored_as_paused() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();

    {
        let engine = build_engine(
            &registration_doc(120, None),
            registration_handlers(),
            dir.path(),
            clock.clone(),
        );
        let executor = build_executor(&clock);
        executor.register_engine(engine.clone(), None);

        // One instance runs all the way through verification
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
        executor.remove_paused_instance(&id);
        engine.close().unwrap();
    }

    let engine = build_engine(
        &registration_doc(120, None),
        registration_handlers(),
        dir.path(),
        clock.clone(),
    );
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    // Terminated instances carry no pause markers, so nothing is restored
    assert_eq!(executor.restore_paused_instances(&engine, &[]).await, 0);
    assert!(executor.paused_instances().is_empty());
}
