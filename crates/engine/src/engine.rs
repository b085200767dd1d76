// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine facade: coordinates the state machine with the durable store.
//!
//! Every mutation persists before it returns: contexts are snapshotted
//! after each step, events before the step they trigger, history rows with
//! the context they describe. Reads go through the in-memory view,
//! populating it from the store on demand.

use crate::error::{EngineError, StateError};
use crate::machine::StateMachine;
use crate::registry::{HandlerRegistry, HandlerTable};
use rotor_core::{
    Clock, Event, IdGen, PauseInfo, ShortId, StateContext, StateHistoryEntry, StateResult,
    SystemClock, UuidIdGen,
};
use rotor_flow::{load_flow, FlowConfig, StateDef};
use rotor_storage::ContextStore;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callbacks for [`Engine::run_until_complete`].
#[derive(Default)]
pub struct RunCallbacks {
    pub on_state_change: Option<Box<dyn Fn(&str, &str) + Send + Sync>>,
    pub on_complete: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(&EngineError) + Send + Sync>>,
}

impl RunCallbacks {
    pub fn on_state_change(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&EngineError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// One engine serves one flow definition against one store.
pub struct Engine<C: Clock = SystemClock> {
    id: String,
    flow: Arc<FlowConfig>,
    store: Arc<ContextStore>,
    machine: StateMachine,
    registry: Arc<HandlerRegistry>,
    clock: C,
    id_gen: UuidIdGen,
}

impl Engine<SystemClock> {
    /// Build an engine from a flow document path and a store directory,
    /// binding the flow's `functions` section against `handlers`.
    pub fn from_config(
        config_path: &Path,
        store_dir: &Path,
        handlers: HandlerTable,
    ) -> Result<Self, EngineError> {
        let flow = load_flow(config_path)?;
        let store = Arc::new(ContextStore::open(store_dir)?);
        let registry = Arc::new(HandlerRegistry::new());
        let bound = registry.bind(&flow.bindings, &handlers);
        info!(
            flow = %flow.name,
            states = flow.state_count(),
            handlers = bound,
            "engine configured"
        );
        Ok(Self::new(flow, store, registry, SystemClock))
    }
}

impl<C: Clock> Engine<C> {
    pub fn new(
        flow: FlowConfig,
        store: Arc<ContextStore>,
        registry: Arc<HandlerRegistry>,
        clock: C,
    ) -> Self {
        let id_gen = UuidIdGen;
        let id = format!("{}-{}", flow.name, id_gen.next().short(8));
        let flow = Arc::new(flow);
        Self {
            id,
            machine: StateMachine::new(Arc::clone(&flow), Arc::clone(&registry)),
            flow,
            store,
            registry,
            clock,
            id_gen,
        }
    }

    /// Stable identifier for this engine within an executor.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flow(&self) -> &Arc<FlowConfig> {
        &self.flow
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state_def(&self, state_id: &str) -> Option<&StateDef> {
        self.flow.get_state(state_id)
    }

    /// Terminal policy over a state id (type or marker substrings).
    pub fn is_terminal(&self, state_id: &str) -> bool {
        self.flow.is_terminal_state(state_id)
    }

    /// Start a new instance at the flow's initial state.
    ///
    /// The instance id is freshly generated, prefixed when a prefix is
    /// given. The context is persisted before the instance is visible.
    pub fn start(
        &self,
        prefix: Option<&str>,
        local_state: HashMap<String, Value>,
    ) -> Result<StateContext, EngineError> {
        let generated = self.id_gen.next();
        let instance_id = match prefix {
            Some(p) if !p.is_empty() => format!("{}-{}", p, generated),
            _ => generated,
        };

        let ctx = StateContext::new_with_epoch_ms(instance_id.as_str(), self.clock.epoch_ms())
            .with_local_state(local_state)
            .with_current_state(self.flow.initial_state().id.clone());

        self.store.save_context(&ctx)?;
        let ctx = self.machine.start(ctx);
        info!(
            instance = %ctx.id,
            state = ctx.current_state_id.as_deref().unwrap_or(""),
            flow = %self.flow.name,
            "instance started"
        );
        Ok(ctx)
    }

    /// Current state of an instance, loading from the store on a cold view.
    pub fn current_state(&self, id: &str) -> Option<String> {
        self.ensure_loaded(id);
        self.machine.current_state(id)
    }

    /// Context of an instance, loading from the store on a cold view.
    pub fn context(&self, id: &str) -> Option<StateContext> {
        self.ensure_loaded(id);
        self.machine.context(id)
    }

    /// Populate the in-memory view from the store if it lacks the id.
    fn ensure_loaded(&self, id: &str) {
        if self.machine.contains(id) {
            return;
        }
        if let Some(ctx) = self.store.load_context(id) {
            if let Err(e) = self.machine.restore(ctx) {
                warn!(instance = id, error = %e, "failed to restore instance view");
            }
        }
    }

    /// Run one process step: persist the event, execute the step, persist
    /// the history row and updated context.
    pub async fn process(
        &self,
        id: &str,
        event_type: &str,
        event_name: &str,
        payload: Option<HashMap<String, Value>>,
    ) -> Result<StateResult, EngineError> {
        let event = Event::new(self.id_gen.next(), event_type, event_name, self.clock.epoch_ms())
            .with_source(self.id.clone())
            .with_payload(payload.unwrap_or_default());
        self.deliver(id, event).await
    }

    /// Run one process step for a synthesized timeout event (payload
    /// `{"timeout": true}`), used when a pause outlives its deadline.
    pub async fn process_timeout(
        &self,
        id: &str,
        event_type: &str,
        event_name: &str,
    ) -> Result<StateResult, EngineError> {
        let event = Event::timeout(self.id_gen.next(), event_type, event_name, self.clock.epoch_ms());
        self.deliver(id, event).await
    }

    /// Deliver an event: persist it, execute the step, persist the history
    /// row and updated context.
    async fn deliver(&self, id: &str, event: Event) -> Result<StateResult, EngineError> {
        self.ensure_loaded(id);
        let now_ms = self.clock.epoch_ms();
        debug!(instance = id, event = %event.log_summary(), "delivering event");

        // Event first: a crash mid-step replays as an event that reached a
        // step which never committed (at-least-once).
        self.store.save_event(id, &event)?;

        let outcome = self.machine.process_event(id, &event, now_ms).await?;

        let entry = StateHistoryEntry::new(
            id,
            Some(outcome.from.clone()),
            outcome
                .context
                .current_state_id
                .clone()
                .unwrap_or_else(|| outcome.from.clone()),
            Some(event.id.clone()),
            now_ms,
        );

        if let Err(e) = self.store.save_step(None, &entry, &outcome.context) {
            // Abort the step: drop the in-memory view so the next access
            // rereads the pre-step snapshot from the store.
            self.machine.evict(id);
            return Err(e.into());
        }

        Ok(outcome.result)
    }

    /// Force an instance into `target` without running its handler, and
    /// persist the transition with an event-less history row.
    pub fn force_transition(
        &self,
        id: &str,
        target: &str,
        reason: &str,
    ) -> Result<(), EngineError> {
        self.ensure_loaded(id);
        let now_ms = self.clock.epoch_ms();

        let outcome = self.machine.force_transition(id, target, reason, now_ms)?;
        info!(instance = id, from = %outcome.from, to = target, reason, "forced transition");

        let entry = StateHistoryEntry::new(
            id,
            Some(outcome.from.clone()),
            target.to_string(),
            None,
            now_ms,
        );
        if let Err(e) = self.store.save_step(None, &entry, &outcome.context) {
            self.machine.evict(id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Park an instance: write the pause markers to the in-memory view and
    /// the store, and return the mirror record for the executor's index.
    pub fn mark_paused(&self, id: &str) -> Result<PauseInfo, EngineError> {
        self.ensure_loaded(id);
        let current = self
            .machine
            .current_state(id)
            .ok_or_else(|| StateError::UnknownInstance(id.to_string()))?;
        let timeout = self.flow.pause_timeout_for(&current);
        let now_ms = self.clock.epoch_ms();

        let ctx = self.machine.mark_paused(id, timeout, now_ms)?;
        self.store.save_context(&ctx)?;

        Ok(PauseInfo::new(id, current, now_ms, timeout, self.id.clone()))
    }

    /// Strip pause markers (if any) from the in-memory view and the store.
    pub fn clear_pause_markers(&self, id: &str) -> Result<bool, EngineError> {
        self.ensure_loaded(id);
        match self.machine.clear_pause_markers(id)? {
            Some(ctx) => {
                self.store.save_context(&ctx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drive an instance until it reaches a terminal state or the next
    /// state pauses on enter. Errors are reported through `on_error` and
    /// end the run; the instance is never left mid-step.
    pub async fn run_until_complete(
        &self,
        id: &str,
        event_type: &str,
        event_name: &str,
        callbacks: &RunCallbacks,
    ) -> Result<String, EngineError> {
        loop {
            let Some(current) = self.current_state(id) else {
                return Err(StateError::UnknownInstance(id.to_string()).into());
            };

            if self.is_terminal(&current) {
                if let Some(cb) = &callbacks.on_complete {
                    cb(&current);
                }
                return Ok(current);
            }

            if self
                .state_def(&current)
                .is_some_and(|def| def.pause_on_enter)
            {
                // Parked; an external event resumes the instance
                return Ok(current);
            }

            match self.process(id, event_type, event_name, None).await {
                Ok(_) => {}
                Err(e) => {
                    warn!(instance = id, error = %e, "run aborted");
                    if let Some(cb) = &callbacks.on_error {
                        cb(&e);
                    }
                    return Ok(current);
                }
            }

            let after = self.current_state(id).unwrap_or_else(|| current.clone());
            if after == current {
                // No edge matched: stuck, nothing more to drive
                warn!(instance = id, state = %current, "no transition matched; stopping");
                return Ok(after);
            }
            if let Some(cb) = &callbacks.on_state_change {
                cb(&current, &after);
            }
        }
    }

    /// Flush and release the store.
    pub fn close(&self) -> Result<(), EngineError> {
        self.store.close()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
