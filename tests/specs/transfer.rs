//! Transfer flow: straight-line execution and the failure branch.

use crate::prelude::*;
use rotor_core::FakeClock;
use rotor_engine::{ExecuteOptions, RunCallbacks};
use serde_json::json;
use tempfile::tempdir;

#[tokio::test]
async fn happy_path_reaches_transfer_success() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(TRANSFER_FLOW, transfer_handlers(), dir.path(), clock);

    let id = engine.start(None, transfer_seed()).unwrap().id;

    let final_state = engine
        .run_until_complete(id.as_str(), "process", "process", &RunCallbacks::default())
        .await
        .unwrap();
    assert_eq!(final_state, "transfer_success");

    // Handler data accumulated into local state
    let ctx = engine.context(id.as_str()).unwrap();
    assert_eq!(ctx.local_state.get("transferId"), Some(&json!("tx-200")));
    assert_eq!(ctx.local_state.get("accountsValid"), Some(&json!(true)));
    assert_eq!(ctx.local_state.get("balance"), Some(&json!(300)));

    // Four transitions: four history rows, four events
    let history = engine.store().get_state_history(id.as_str());
    assert_eq!(history.len(), 4);
    let visited: Vec<&str> = history.iter().map(|h| h.to_state_id.as_str()).collect();
    assert_eq!(
        visited,
        vec![
            "validating_accounts",
            "checking_balance",
            "transferring",
            "transfer_success"
        ]
    );
    assert_eq!(engine.store().get_event_history(id.as_str()).len(), 4);

    // Every history row names the event that caused it
    assert!(history.iter().all(|h| h.event_id.is_some()));
}

#[tokio::test]
async fn insufficient_balance_takes_failure_branch() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(TRANSFER_FLOW, transfer_handlers(), dir.path(), clock);

    let mut seed = transfer_seed();
    seed.insert("amount".to_string(), json!(900));
    let id = engine.start(None, seed).unwrap().id;

    let final_state = engine
        .run_until_complete(id.as_str(), "process", "process", &RunCallbacks::default())
        .await
        .unwrap();
    assert_eq!(final_state, "transfer_failed");

    // The failure transition is recorded; transferring was never visited
    let history = engine.store().get_state_history(id.as_str());
    let visited: Vec<&str> = history.iter().map(|h| h.to_state_id.as_str()).collect();
    assert_eq!(
        visited,
        vec!["validating_accounts", "checking_balance", "transfer_failed"]
    );
    assert!(!visited.contains(&"transferring"));
    assert!(!engine
        .context(id.as_str())
        .unwrap()
        .local_state
        .contains_key("transferId"));
}

#[tokio::test]
async fn missing_accounts_fail_validation() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(TRANSFER_FLOW, transfer_handlers(), dir.path(), clock);

    let id = engine
        .start(None, [("amount".to_string(), json!(10))].into())
        .unwrap()
        .id;

    let final_state = engine
        .run_until_complete(id.as_str(), "process", "process", &RunCallbacks::default())
        .await
        .unwrap();
    assert_eq!(final_state, "transfer_failed");
}

#[tokio::test]
async fn executor_drives_transfer_to_completion() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(TRANSFER_FLOW, transfer_handlers(), dir.path(), clock.clone());
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let id = engine.start(None, transfer_seed()).unwrap().id.to_string();
    executor.execute_async(&engine, &id, ExecuteOptions::default());
    wait_idle(&executor, &id).await;

    assert_eq!(
        engine.current_state(&id).as_deref(),
        Some("transfer_success")
    );
    assert!(executor.paused_instances().is_empty());

    // Store and memory agree on the final state
    let stored = engine.store().load_context(&id).unwrap();
    assert_eq!(stored.current_state_id.as_deref(), Some("transfer_success"));
}

#[tokio::test]
async fn concurrent_instances_do_not_interfere() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let engine = build_engine(TRANSFER_FLOW, transfer_handlers(), dir.path(), clock.clone());
    let executor = build_executor(&clock);
    executor.register_engine(engine.clone(), None);

    let mut ids = Vec::new();
    for i in 0..8 {
        let mut seed = transfer_seed();
        // Half the instances overdraw and fail
        let amount = if i % 2 == 0 { 100 + i } else { 900 };
        seed.insert("amount".to_string(), json!(amount));
        let id = engine.start(None, seed).unwrap().id.to_string();
        executor.execute_async(&engine, &id, ExecuteOptions::default());
        ids.push((id, amount));
    }

    for (id, amount) in &ids {
        wait_idle(&executor, id).await;
        let expected = if *amount <= 500 {
            "transfer_success"
        } else {
            "transfer_failed"
        };
        assert_eq!(engine.current_state(id).as_deref(), Some(expected), "instance {id}");
        // Each instance owns its own history
        assert!(!engine.store().get_state_history(id).is_empty());
    }

    let ids_in_store = engine.store().list_context_ids();
    assert_eq!(ids_in_store.len(), 8);
}
