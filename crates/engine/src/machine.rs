// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance state machine.
//!
//! Holds the in-memory view of each instance (current state + context) and
//! executes one transition step at a time. Persistence belongs to the
//! engine facade: the in-memory view may lag the store but never leads it.

use crate::error::StateError;
use crate::registry::HandlerRegistry;
use parking_lot::Mutex;
use rotor_core::{Event, StateContext, StateResult};
use rotor_flow::{FlowConfig, StateDef, TransitionCondition};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of one atomic step: the handler result, the edge taken, and the
/// updated context (already reflected in the in-memory view).
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub result: StateResult,
    pub from: String,
    /// Matched target state, or `None` when no edge matched; the instance
    /// stays where it is (terminal or stuck).
    pub to: Option<String>,
    pub context: StateContext,
}

/// In-memory instance views over an immutable flow definition.
pub struct StateMachine {
    flow: Arc<FlowConfig>,
    registry: Arc<HandlerRegistry>,
    current: Mutex<HashMap<String, String>>,
    contexts: Mutex<HashMap<String, StateContext>>,
}

impl StateMachine {
    pub fn new(flow: Arc<FlowConfig>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            flow,
            registry,
            current: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn flow(&self) -> &Arc<FlowConfig> {
        &self.flow
    }

    /// Look up a state definition in the flow.
    pub fn state_def(&self, state_id: &str) -> Option<&StateDef> {
        self.flow.get_state(state_id)
    }

    /// Whether the in-memory view knows this instance.
    pub fn contains(&self, id: &str) -> bool {
        self.current.lock().contains_key(id)
    }

    /// Create or return the in-memory view for an instance.
    ///
    /// An already-known id (e.g. restored earlier) is returned unchanged.
    /// Otherwise the context's current state is installed, falling back to
    /// the flow's initial state.
    pub fn start(&self, ctx: StateContext) -> StateContext {
        let id = ctx.id.as_str().to_string();
        {
            let contexts = self.contexts.lock();
            if let Some(existing) = contexts.get(&id) {
                return existing.clone();
            }
        }

        let mut ctx = ctx;
        let state_id = ctx
            .current_state_id
            .clone()
            .unwrap_or_else(|| self.flow.initial_state().id.clone());
        ctx.current_state_id = Some(state_id.clone());

        self.current.lock().insert(id.clone(), state_id);
        self.contexts.lock().insert(id, ctx.clone());
        ctx
    }

    /// Rehydrate the in-memory view from a persisted context.
    pub fn restore(&self, ctx: StateContext) -> Result<(), StateError> {
        let state_id = ctx
            .current_state_id
            .clone()
            .ok_or_else(|| StateError::NoCurrentState(ctx.id.to_string()))?;
        let id = ctx.id.as_str().to_string();
        self.current.lock().insert(id.clone(), state_id);
        self.contexts.lock().insert(id, ctx);
        Ok(())
    }

    /// Drop an instance from the in-memory view; the next access rereads
    /// from the store.
    pub fn evict(&self, id: &str) {
        self.current.lock().remove(id);
        self.contexts.lock().remove(id);
    }

    pub fn current_state(&self, id: &str) -> Option<String> {
        self.current.lock().get(id).cloned()
    }

    pub fn context(&self, id: &str) -> Option<StateContext> {
        self.contexts.lock().get(id).cloned()
    }

    /// Execute one atomic step for an instance.
    ///
    /// The event is recorded into the context window before the handler
    /// runs, so handlers read the triggering event (and its payload) as the
    /// most recent entry. Handler errors arrive here already converted to
    /// failing results; transition selection runs either way.
    pub async fn process_event(
        &self,
        id: &str,
        event: &Event,
        now_ms: u64,
    ) -> Result<StepOutcome, StateError> {
        let (current, mut ctx) = self.instance(id)?;
        if self.flow.get_state(&current).is_none() {
            return Err(StateError::UnknownState(id.to_string(), current));
        }

        ctx.record_event(event.clone());

        let result = self.registry.run_handler(&current, &ctx).await;
        let next = self.find_next_state(&current, &result);

        ctx.merge_local(result.data.clone());
        ctx.current_state_id = Some(next.clone().unwrap_or_else(|| current.clone()));
        ctx.last_updated_at_ms = now_ms;
        ctx.clear_pause_markers();

        debug!(
            instance = id,
            from = %current,
            to = next.as_deref().unwrap_or(&current),
            success = result.success,
            "processed step"
        );

        self.install(id, &ctx);
        Ok(StepOutcome {
            result,
            from: current,
            to: next,
            context: ctx,
        })
    }

    /// Move an instance to `target` without running any handler.
    ///
    /// Only the current state and timestamp change; local state is left
    /// untouched. Pause markers are stripped (a forced transition ends the
    /// pause that scheduled it).
    pub fn force_transition(
        &self,
        id: &str,
        target: &str,
        reason: &str,
        now_ms: u64,
    ) -> Result<StepOutcome, StateError> {
        if self.flow.get_state(target).is_none() {
            return Err(StateError::UnknownTarget {
                target: target.to_string(),
                flow: self.flow.name.clone(),
            });
        }

        let (current, mut ctx) = self.instance(id)?;
        ctx.current_state_id = Some(target.to_string());
        ctx.last_updated_at_ms = now_ms;
        ctx.clear_pause_markers();

        debug!(instance = id, from = %current, to = target, reason, "forced transition");

        self.install(id, &ctx);
        Ok(StepOutcome {
            result: StateResult::ok(),
            from: current,
            to: Some(target.to_string()),
            context: ctx,
        })
    }

    /// Write the pause markers into an instance's in-memory context.
    pub fn mark_paused(
        &self,
        id: &str,
        timeout_secs: Option<i64>,
        now_ms: u64,
    ) -> Result<StateContext, StateError> {
        let (current, mut ctx) = self.instance(id)?;
        ctx.mark_paused(&current, timeout_secs, now_ms);
        self.install(id, &ctx);
        Ok(ctx)
    }

    /// Strip pause markers from an instance's in-memory context.
    ///
    /// Returns the updated context, or `None` when no marker was present.
    pub fn clear_pause_markers(&self, id: &str) -> Result<Option<StateContext>, StateError> {
        let (_, mut ctx) = self.instance(id)?;
        if !ctx.clear_pause_markers() {
            return Ok(None);
        }
        self.install(id, &ctx);
        Ok(Some(ctx))
    }

    /// Pick the next state for a handler result: first matching edge out of
    /// `from` in descending priority (ties keep document order).
    pub fn find_next_state(&self, from: &str, result: &StateResult) -> Option<String> {
        for edge in self.flow.transitions_from(from) {
            let matched = match edge.condition.matches_builtin(result) {
                Some(m) => m,
                None => match &edge.condition {
                    TransitionCondition::Custom(name) => {
                        self.registry.eval_condition(name, result)
                    }
                    _ => false,
                },
            };
            if matched {
                return Some(edge.to.clone());
            }
        }
        None
    }

    fn instance(&self, id: &str) -> Result<(String, StateContext), StateError> {
        let current = self
            .current
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StateError::UnknownInstance(id.to_string()))?;
        let ctx = self
            .contexts
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StateError::UnknownInstance(id.to_string()))?;
        Ok((current, ctx))
    }

    fn install(&self, id: &str, ctx: &StateContext) {
        if let Some(state_id) = &ctx.current_state_id {
            self.current.lock().insert(id.to_string(), state_id.clone());
        }
        self.contexts.lock().insert(id.to_string(), ctx.clone());
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
