// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rotor-core: shared domain types for the rotor state-rotation engine

pub mod clock;
pub mod context;
pub mod event;
pub mod history;
pub mod id;
pub mod pause;
pub mod result;

pub use clock::{Clock, FakeClock, SystemClock};
pub use context::{
    StateContext, PAUSED_AT_KEY, PAUSED_STATE_KEY, PAUSE_TIMEOUT_KEY, RECENT_EVENTS_LIMIT,
};
pub use event::{Event, EventPriority, EventType};
pub use history::StateHistoryEntry;
pub use id::{ContextId, EventId, IdGen, SequentialIdGen, ShortId, UuidIdGen};
pub use pause::PauseInfo;
pub use result::StateResult;
