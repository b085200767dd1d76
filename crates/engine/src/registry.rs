// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler registry: binds user code to state ids.
//!
//! One handler per state is honoured: on duplicate registrations the
//! highest priority wins (ties go to the earliest registration) and the
//! rest are ignored. A state with no handler yields an implicit success
//! result with empty data, so pure routing states exist without code.

use async_trait::async_trait;
use parking_lot::Mutex;
use rotor_core::{StateContext, StateResult};
use rotor_flow::HandlerBinding;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Error returned by user handler code. Never escapes a process step: the
/// machine converts it into a failing [`StateResult`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// User code bound to a state, invoked once per visit.
#[async_trait]
pub trait StateHandler: Send + Sync {
    async fn invoke(&self, ctx: &StateContext) -> Result<StateResult, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> StateHandler for FnHandler<F>
where
    F: Fn(StateContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateResult, HandlerError>> + Send,
{
    async fn invoke(&self, ctx: &StateContext) -> Result<StateResult, HandlerError> {
        (self.0)(ctx.clone()).await
    }
}

/// Wrap an async closure as a [`StateHandler`].
///
/// The closure receives an owned snapshot of the context.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn StateHandler>
where
    F: Fn(StateContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateResult, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Invocation metadata carried by a registration.
#[derive(Debug, Clone, Default)]
pub struct HandlerMeta {
    pub description: Option<String>,
    /// Duplicate resolution: highest priority wins.
    pub priority: i32,
    /// Advisory per-invocation deadline in seconds.
    pub timeout_secs: Option<u64>,
    /// Invocation retries on handler error (around the handler only).
    pub retry_count: u32,
    pub tags: Vec<String>,
}

impl From<&HandlerBinding> for HandlerMeta {
    fn from(b: &HandlerBinding) -> Self {
        Self {
            description: b.description.clone(),
            priority: b.priority,
            timeout_secs: b.timeout,
            retry_count: b.retry_count,
            tags: b.tags.clone(),
        }
    }
}

struct Registered {
    handler: Arc<dyn StateHandler>,
    meta: HandlerMeta,
}

type ConditionFn = dyn Fn(&StateResult) -> bool + Send + Sync;

/// Registry of state handlers and custom transition predicates.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<String, Vec<Registered>>>,
    conditions: Mutex<HashMap<String, Arc<ConditionFn>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a state with default metadata.
    pub fn register(&self, state_id: impl Into<String>, handler: Arc<dyn StateHandler>) {
        self.register_with_meta(state_id, handler, HandlerMeta::default());
    }

    /// Register a handler with explicit metadata.
    pub fn register_with_meta(
        &self,
        state_id: impl Into<String>,
        handler: Arc<dyn StateHandler>,
        meta: HandlerMeta,
    ) {
        let state_id = state_id.into();
        let mut handlers = self.handlers.lock();
        let slot = handlers.entry(state_id.clone()).or_default();
        if !slot.is_empty() {
            warn!(
                state_id = %state_id,
                registered = slot.len() + 1,
                "multiple handlers for state; only the highest priority will run"
            );
        }
        slot.push(Registered { handler, meta });
    }

    /// Bind flow `functions` entries against a table of named handlers.
    ///
    /// Returns the number of bindings resolved; names without a table entry
    /// are skipped with a warning.
    pub fn bind(&self, bindings: &[HandlerBinding], table: &HandlerTable) -> usize {
        let mut bound = 0;
        for binding in bindings {
            match table.get(&binding.function_name) {
                Some(handler) => {
                    self.register_with_meta(
                        &binding.state_id,
                        Arc::clone(handler),
                        HandlerMeta::from(binding),
                    );
                    bound += 1;
                }
                None => {
                    warn!(
                        state_id = %binding.state_id,
                        function = %binding.function_name,
                        "no handler named in binding; state will use implicit success"
                    );
                }
            }
        }
        bound
    }

    /// Whether a state has at least one registered handler.
    pub fn has_handler(&self, state_id: &str) -> bool {
        self.handlers
            .lock()
            .get(state_id)
            .is_some_and(|slot| !slot.is_empty())
    }

    /// Register a named transition predicate for `Custom` conditions.
    pub fn register_condition<F>(&self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&StateResult) -> bool + Send + Sync + 'static,
    {
        self.conditions.lock().insert(name.into(), Arc::new(predicate));
    }

    /// Evaluate a custom condition. Unregistered names never match.
    pub fn eval_condition(&self, name: &str, result: &StateResult) -> bool {
        let predicate = self.conditions.lock().get(name).cloned();
        match predicate {
            Some(p) => p(result),
            None => {
                warn!(condition = name, "unregistered custom condition never matches");
                false
            }
        }
    }

    /// Resolve and run the handler for a state.
    ///
    /// Handler errors become failing results carrying the error message;
    /// they never propagate out of a process step. `retry_count` retries
    /// apply to errors; an advisory `timeout_secs` deadline produces the
    /// failing "handler timeout" result without retrying.
    pub async fn run_handler(&self, state_id: &str, ctx: &StateContext) -> StateResult {
        let resolved = {
            let handlers = self.handlers.lock();
            let Some(slot) = handlers.get(state_id).filter(|slot| !slot.is_empty()) else {
                // No handler: pure routing state
                return StateResult::ok();
            };
            let best = slot
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| {
                    // Highest priority wins; earliest registration breaks ties
                    a.meta
                        .priority
                        .cmp(&b.meta.priority)
                        .then(ib.cmp(ia))
                })
                .map(|(_, r)| (Arc::clone(&r.handler), r.meta.clone()));
            match best {
                Some(r) => r,
                None => return StateResult::ok(),
            }
        };
        let (handler, meta) = resolved;

        let attempts = meta.retry_count + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let invocation = handler.invoke(ctx);
            let outcome = match meta.timeout_secs {
                Some(secs) => {
                    match tokio::time::timeout(Duration::from_secs(secs), invocation).await {
                        Ok(r) => r,
                        Err(_) => {
                            warn!(state_id, timeout_secs = secs, "handler timeout");
                            return StateResult::fail("handler timeout");
                        }
                    }
                }
                None => invocation.await,
            };

            match outcome {
                Ok(result) => return result,
                Err(e) => {
                    warn!(state_id, attempt, error = %e, "handler error");
                    last_error = e.0;
                }
            }
        }

        StateResult::fail(last_error)
    }
}

/// Named handlers supplied by the embedding application, resolved against
/// the flow document's `functions` section.
pub type HandlerTable = HashMap<String, Arc<dyn StateHandler>>;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
