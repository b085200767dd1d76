// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use thiserror::Error;

/// Errors from state machine operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("instance {0} references state '{1}' which is not in the flow")]
    UnknownState(String, String),

    #[error("transition target '{target}' does not exist in flow '{flow}'")]
    UnknownTarget { target: String, flow: String },

    #[error("cannot restore instance {0}: persisted context has no current state")]
    NoCurrentState(String),
}

/// Errors surfaced by the engine facade and executor.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid flow document; fatal at load.
    #[error("configuration error: {0}")]
    Config(#[from] rotor_flow::ParseError),

    /// Unknown instance or state, illegal transition target.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Store I/O failure; the current step is aborted and the in-memory
    /// view rereads from the store on next access.
    #[error("persistence error: {0}")]
    Store(#[from] rotor_storage::StoreError),
}
