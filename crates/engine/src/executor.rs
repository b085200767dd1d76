// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, pausable, timeout-aware instance runner.
//!
//! Each active instance is driven by exactly one tokio task; a single
//! background task monitors pause timeouts. The in-memory indices mirror
//! the store: `paused` mirrors the persisted `_pause*` markers, `running`
//! tracks live task handles for cooperative cancellation.

use crate::engine::{Engine, RunCallbacks};
use crate::error::EngineError;
use parking_lot::Mutex;
use rotor_core::{Clock, PauseInfo, StateResult};
use rotor_flow::TimeoutAction;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cadence configuration; defaults match production, tests compress time.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout monitor sweep interval.
    pub tick: Duration,
    /// Monitor sleep after an unexpected sweep error.
    pub error_backoff: Duration,
    /// Yield between steps of the durable loop, bounding per-instance rate.
    pub step_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            error_backoff: Duration::from_secs(10),
            step_delay: Duration::from_millis(100),
        }
    }
}

/// Options for [`WorkflowExecutor::execute_async`].
#[derive(Default)]
pub struct ExecuteOptions {
    /// Run to completion via the engine driver instead of the durable loop.
    pub auto_process: bool,
    /// Extra parking points: substring-matched against state ids.
    pub stop_states: Vec<String>,
    pub on_state_change: Option<Box<dyn Fn(&str, &str) + Send + Sync>>,
    pub on_complete: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

struct EngineEntry<C: Clock> {
    engine: Arc<Engine<C>>,
    /// Instance-id prefix hint for routing.
    prefix: Option<String>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives many concurrent instances over registered engines.
pub struct WorkflowExecutor<C: Clock> {
    engines: Mutex<HashMap<String, EngineEntry<C>>>,
    default_engine: Mutex<Option<String>>,
    running: Mutex<HashMap<String, RunningTask>>,
    paused: Mutex<HashMap<String, PauseInfo>>,
    monitor: Mutex<Option<MonitorTask>>,
    clock: C,
    config: ExecutorConfig,
}

impl<C: Clock> WorkflowExecutor<C> {
    pub fn new(clock: C, config: ExecutorConfig) -> Arc<Self> {
        Arc::new(Self {
            engines: Mutex::new(HashMap::new()),
            default_engine: Mutex::new(None),
            running: Mutex::new(HashMap::new()),
            paused: Mutex::new(HashMap::new()),
            monitor: Mutex::new(None),
            clock,
            config,
        })
    }

    /// Register an engine, optionally with an instance-id prefix hint for
    /// routing. The first registered engine is the default route.
    pub fn register_engine(&self, engine: Arc<Engine<C>>, prefix: Option<String>) {
        let engine_id = engine.id().to_string();
        self.engines
            .lock()
            .insert(engine_id.clone(), EngineEntry { engine, prefix });
        let mut default = self.default_engine.lock();
        if default.is_none() {
            *default = Some(engine_id);
        }
    }

    /// Look up an engine by id.
    pub fn engine(&self, engine_id: &str) -> Option<Arc<Engine<C>>> {
        self.engines
            .lock()
            .get(engine_id)
            .map(|e| Arc::clone(&e.engine))
    }

    /// Route an instance id to an engine: prefix hints first, then the
    /// default engine.
    pub fn engine_for_instance(&self, instance_id: &str) -> Option<Arc<Engine<C>>> {
        let engines = self.engines.lock();
        for entry in engines.values() {
            if let Some(prefix) = &entry.prefix {
                if instance_id.starts_with(prefix.as_str()) {
                    return Some(Arc::clone(&entry.engine));
                }
            }
        }
        let default = self.default_engine.lock();
        default
            .as_deref()
            .and_then(|id| engines.get(id))
            .map(|e| Arc::clone(&e.engine))
    }

    /// Whether a live task currently owns the instance.
    pub fn is_running(&self, instance_id: &str) -> bool {
        self.running
            .lock()
            .get(instance_id)
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Projection of the paused-instance index.
    pub fn paused_instances(&self) -> Vec<PauseInfo> {
        let mut entries: Vec<PauseInfo> = self.paused.lock().values().cloned().collect();
        entries.sort_by_key(|p| p.paused_at_ms);
        entries
    }

    /// Drop an instance from the paused index without touching persistence.
    ///
    /// Used after a resume step has already rewritten the context without
    /// its pause markers.
    pub fn remove_paused_instance(&self, instance_id: &str) -> Option<PauseInfo> {
        self.paused.lock().remove(instance_id)
    }

    /// Deliver an event to an instance (proxy to the engine's process).
    /// Callers typically follow up with `continue_execution` to drain any
    /// downstream states.
    pub async fn trigger_event(
        &self,
        engine: &Arc<Engine<C>>,
        instance_id: &str,
        event_type: &str,
        event_name: &str,
        payload: Option<HashMap<String, Value>>,
    ) -> Result<StateResult, EngineError> {
        engine.process(instance_id, event_type, event_name, payload).await
    }

    /// Spawn the driver task for an instance.
    ///
    /// Auto mode delegates to the engine's synchronous driver. Durable mode
    /// runs the parking loop: instances stop at pause-on-enter states (and
    /// configured stop states), writing the durable pause markers before
    /// the task exits.
    pub fn execute_async(
        self: &Arc<Self>,
        engine: &Arc<Engine<C>>,
        instance_id: &str,
        opts: ExecuteOptions,
    ) {
        // At most one task per instance: replace any existing driver.
        self.cancel_running(instance_id);

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let executor = Arc::clone(self);
        let engine = Arc::clone(engine);
        let id = instance_id.to_string();

        let handle = tokio::spawn(async move {
            if opts.auto_process {
                executor.drive_auto(&engine, &id, opts).await;
            } else {
                executor.drive_durable(&engine, &id, opts, task_cancel).await;
            }
            executor.running.lock().remove(&id);
        });

        self.running
            .lock()
            .insert(instance_id.to_string(), RunningTask { cancel, handle });
    }

    async fn drive_auto(&self, engine: &Arc<Engine<C>>, id: &str, opts: ExecuteOptions) {
        let callbacks = RunCallbacks {
            on_state_change: opts.on_state_change,
            on_complete: opts.on_complete,
            on_error: None,
        };
        match engine
            .run_until_complete(id, "process", "process", &callbacks)
            .await
        {
            Ok(state) => {
                if engine.is_terminal(&state) {
                    self.paused.lock().remove(id);
                }
            }
            Err(e) => warn!(instance = id, error = %e, "auto run failed"),
        }
    }

    async fn drive_durable(
        &self,
        engine: &Arc<Engine<C>>,
        id: &str,
        opts: ExecuteOptions,
        cancel: CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                debug!(instance = id, "driver cancelled");
                return;
            }

            let Some(current) = engine.current_state(id) else {
                warn!(instance = id, "instance vanished; stopping driver");
                return;
            };

            let pause_on_enter = engine
                .state_def(&current)
                .is_some_and(|def| def.pause_on_enter);
            let stop_match = opts.stop_states.iter().any(|s| current.contains(s.as_str()));

            if pause_on_enter || stop_match {
                match engine.mark_paused(id) {
                    Ok(info) => {
                        info!(
                            instance = id,
                            state = %current,
                            timeout_secs = ?info.timeout_secs,
                            "instance parked"
                        );
                        self.paused.lock().insert(id.to_string(), info);
                    }
                    Err(e) => {
                        error!(instance = id, error = %e, "failed to persist pause markers");
                    }
                }
                return;
            }

            if engine.is_terminal(&current) {
                if let Some(cb) = &opts.on_complete {
                    cb(&current);
                }
                self.paused.lock().remove(id);
                info!(instance = id, state = %current, "instance complete");
                return;
            }

            match engine.process(id, "process", "process", None).await {
                Ok(_) => {}
                Err(e) => {
                    warn!(instance = id, error = %e, "step failed; stopping driver");
                    return;
                }
            }

            let after = engine.current_state(id).unwrap_or_default();
            if after == current {
                warn!(instance = id, state = %current, "no transition matched; stopping driver");
                return;
            }
            if let Some(cb) = &opts.on_state_change {
                cb(&current, &after);
            }

            // Yield between steps; cancellation lands here
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(instance = id, "driver cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.config.step_delay) => {}
            }
        }
    }

    /// Resume driving an instance after an external event: replaces any
    /// existing task and runs to completion or the next pause state.
    ///
    /// Flows without pause states run through the auto driver; flows with
    /// pause states stay on the durable loop so a downstream pause is
    /// parked with its markers again.
    pub fn continue_execution(
        self: &Arc<Self>,
        engine: &Arc<Engine<C>>,
        instance_id: &str,
        opts: ExecuteOptions,
    ) {
        let auto_process = !engine.flow().has_pause_states();
        self.execute_async(
            engine,
            instance_id,
            ExecuteOptions {
                auto_process,
                ..opts
            },
        );
    }

    /// Rebuild the paused index from persistence after a restart.
    ///
    /// With an empty `ids`, every instance carrying pause markers is
    /// restored. Entries already past their timeout are handled immediately.
    pub async fn restore_paused_instances(
        self: &Arc<Self>,
        engine: &Arc<Engine<C>>,
        ids: &[String],
    ) -> usize {
        let ids: Vec<String> = if ids.is_empty() {
            engine
                .store()
                .find_paused_instances()
                .into_iter()
                .map(|id| id.to_string())
                .collect()
        } else {
            ids.to_vec()
        };

        let now_ms = self.clock.epoch_ms();
        let mut restored = 0;
        let mut expired = Vec::new();

        for id in &ids {
            let Some(ctx) = engine.context(id) else {
                warn!(instance = %id, "paused instance has no context; skipping");
                continue;
            };
            let Some(info) = PauseInfo::from_context(&ctx, engine.id()) else {
                warn!(instance = %id, "context has no pause markers; skipping");
                continue;
            };

            info!(
                instance = %id,
                state = %info.state_id,
                elapsed = %info.elapsed_display(now_ms),
                timeout_secs = ?info.timeout_secs,
                "restored paused instance"
            );
            if info.is_expired(now_ms) {
                expired.push(id.clone());
            }
            self.paused.lock().insert(id.clone(), info);
            restored += 1;
        }

        for id in expired {
            info!(instance = %id, "restored pause already past its timeout");
            if let Err(e) = self.handle_timeout(engine, &id).await {
                error!(instance = %id, error = %e, "expired pause handling failed during restore");
            }
        }

        restored
    }

    /// Start the timeout monitor task (idempotent).
    pub fn start_monitor(self: &Arc<Self>) {
        let mut monitor = self.monitor.lock();
        if monitor.as_ref().is_some_and(|m| !m.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let executor = Arc::clone(self);

        let handle = tokio::spawn(async move {
            info!(tick_secs = executor.config.tick.as_secs(), "timeout monitor started");
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        info!("timeout monitor stopped");
                        return;
                    }
                    _ = tokio::time::sleep(executor.config.tick) => {}
                }

                if let Err(e) = executor.sweep_expired().await {
                    error!(error = %e, "timeout sweep error");
                    tokio::select! {
                        _ = task_cancel.cancelled() => return,
                        _ = tokio::time::sleep(executor.config.error_backoff) => {}
                    }
                }
            }
        });

        *monitor = Some(MonitorTask { cancel, handle });
    }

    /// Whether the monitor task is live.
    pub fn monitor_live(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.handle.is_finished())
    }

    /// One monitor pass: collect expired pauses, handle each.
    ///
    /// Only positive timeouts expire; infinite (`-1`) and absent timeouts
    /// are never collected. Per-instance failures are logged and do not
    /// drop other instances from the sweep.
    pub async fn sweep_expired(self: &Arc<Self>) -> Result<usize, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let expired: Vec<(String, String)> = {
            let paused = self.paused.lock();
            paused
                .values()
                .filter(|p| p.is_expired(now_ms))
                .map(|p| (p.context_id.to_string(), p.engine_id.clone()))
                .collect()
        };

        let count = expired.len();
        let mut first_err = None;
        for (instance_id, engine_id) in expired {
            let engine = self
                .engine(&engine_id)
                .or_else(|| self.engine_for_instance(&instance_id));
            let Some(engine) = engine else {
                warn!(instance = %instance_id, engine = %engine_id, "no engine for expired pause");
                continue;
            };
            if let Err(e) = self.handle_timeout(&engine, &instance_id).await {
                // Keep sweeping; report the failure for the backoff path
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Apply a state's timeout action to an expired pause.
    ///
    /// Whatever the action (or its outcome), the pause is consumed: the
    /// index entry is removed and the durable markers are stripped, so a
    /// timeout fires at most once. A misconfigured action is logged, not
    /// raised; only store failures are reported to the caller.
    pub async fn handle_timeout(
        self: &Arc<Self>,
        engine: &Arc<Engine<C>>,
        instance_id: &str,
    ) -> Result<(), EngineError> {
        // Remove the index entry first: a concurrent resume that already
        // consumed the pause makes this a no-op.
        let Some(info) = self.paused.lock().remove(instance_id) else {
            return Ok(());
        };

        let action = engine
            .state_def(&info.state_id)
            .and_then(|def| def.timeout_action.clone());

        match action {
            Some(TimeoutAction::Transition { target_state }) => {
                info!(
                    instance = instance_id,
                    state = %info.state_id,
                    target = %target_state,
                    "pause timed out; forcing transition"
                );
                if let Err(e) = engine.force_transition(instance_id, &target_state, "timeout") {
                    // Misconfigured target: log, never throw into the monitor
                    error!(
                        instance = instance_id,
                        target = %target_state,
                        error = %e,
                        "misconfigured timeout transition"
                    );
                }
            }
            Some(TimeoutAction::Event {
                event_type,
                event_name,
            }) => {
                info!(
                    instance = instance_id,
                    state = %info.state_id,
                    event_type = %event_type,
                    "pause timed out; emitting event"
                );
                if let Err(e) = engine
                    .process_timeout(instance_id, &event_type, &event_name)
                    .await
                {
                    error!(instance = instance_id, error = %e, "timeout event failed");
                }
            }
            None => {
                warn!(
                    instance = instance_id,
                    state = %info.state_id,
                    "pause timed out but no timeout action is configured"
                );
            }
        }

        // Strip any surviving durable markers (the no-action path, or a
        // failed action above). Successful steps already cleared them.
        match engine.clear_pause_markers(instance_id) {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(instance = instance_id, error = %e, "failed to clear pause markers");
                Err(e)
            }
        }
    }

    /// Cancel the running task for an instance at its next yield point.
    /// Persistence is never touched.
    pub fn stop(&self, instance_id: &str) -> bool {
        self.cancel_running(instance_id)
    }

    /// Cancel all running tasks and shut down the monitor.
    pub fn stop_all(&self) {
        let running: Vec<RunningTask> = {
            let mut map = self.running.lock();
            map.drain().map(|(_, task)| task).collect()
        };
        for task in &running {
            task.cancel.cancel();
        }
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.cancel.cancel();
        }
        info!(cancelled = running.len(), "executor stopped");
    }

    fn cancel_running(&self, instance_id: &str) -> bool {
        let task = self.running.lock().remove(instance_id);
        match task {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
