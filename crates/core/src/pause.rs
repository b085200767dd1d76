// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory pause records mirroring the durable `_pause*` markers.

use crate::context::StateContext;
use crate::id::ContextId;
use serde::{Deserialize, Serialize};

/// Executor-side record of a parked instance.
///
/// Mirrors the persisted pause markers; rebuilt from the store on restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseInfo {
    pub context_id: ContextId,
    pub state_id: String,
    pub paused_at_ms: u64,
    /// Positive values expire; `None` (and the persisted `-1`) never do.
    pub timeout_secs: Option<i64>,
    pub engine_id: String,
}

impl PauseInfo {
    pub fn new(
        context_id: impl Into<ContextId>,
        state_id: impl Into<String>,
        paused_at_ms: u64,
        timeout_secs: Option<i64>,
        engine_id: impl Into<String>,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            state_id: state_id.into(),
            paused_at_ms,
            timeout_secs: timeout_secs.filter(|t| *t > 0),
            engine_id: engine_id.into(),
        }
    }

    /// Rebuild from a persisted context carrying pause markers.
    ///
    /// Returns `None` when the context has no `_pausedAt` marker.
    pub fn from_context(ctx: &StateContext, engine_id: &str) -> Option<Self> {
        let paused_at_ms = ctx.paused_at_ms()?;
        let state_id = ctx.paused_state()?.to_string();
        Some(Self::new(
            ctx.id.clone(),
            state_id,
            paused_at_ms,
            ctx.pause_timeout_secs(),
            engine_id,
        ))
    }

    /// Whole seconds elapsed since the pause.
    pub fn elapsed_secs(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.paused_at_ms) / 1000
    }

    /// Short human-readable form of the elapsed pause time: `"45s"`,
    /// `"3m"`, `"2h10m"`, `"5d"`.
    pub fn elapsed_display(&self, now_ms: u64) -> String {
        let secs = self.elapsed_secs(now_ms);
        match secs {
            0..=59 => format!("{secs}s"),
            60..=3599 => format!("{}m", secs / 60),
            3600..=86399 => {
                let mins = (secs % 3600) / 60;
                if mins == 0 {
                    format!("{}h", secs / 3600)
                } else {
                    format!("{}h{}m", secs / 3600, mins)
                }
            }
            _ => format!("{}d", secs / 86400),
        }
    }

    /// Whether the pause has outlived a positive timeout. Infinite and
    /// absent timeouts never expire.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.timeout_secs {
            Some(t) if t > 0 => self.elapsed_secs(now_ms) >= t as u64,
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "pause_tests.rs"]
mod tests;
