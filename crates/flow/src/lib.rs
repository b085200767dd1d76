// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Flow definition parsing and validation

mod binding;
mod config;
mod parser;
mod state;
mod transition;
mod validate;

pub use binding::HandlerBinding;
pub use config::FlowConfig;
pub use parser::{load_flow, parse_flow, parse_flow_with_format, FlowDocument, Format, ParseError};
pub use state::{StateDef, StateType, TimeoutAction, TERMINAL_MARKERS};
pub use transition::{TransitionCondition, TransitionDef};
pub use validate::ValidateError;
