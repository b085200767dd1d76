// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Runs in a spawned task, accepting connections and dispatching requests
//! onto the engine and executor without blocking either.

use std::sync::Arc;

use rotor_core::SystemClock;
use rotor_engine::{Engine, ExecuteOptions, WorkflowExecutor};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::protocol::{self, PausedEntry, Request, Response, DEFAULT_TIMEOUT};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub engine: Arc<Engine<SystemClock>>,
    pub executor: Arc<WorkflowExecutor<SystemClock>>,
    pub shutdown: Arc<Notify>,
}

/// Listener task for accepting socket connections.
pub struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    /// Run the listener loop, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                protocol::ProtocolError::ConnectionClosed => {
                                    debug!("client disconnected")
                                }
                                protocol::ProtocolError::Timeout => warn!("connection timeout"),
                                _ => error!("connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection (one request, one response).
async fn handle_connection(
    stream: UnixStream,
    ctx: &ListenCtx,
) -> Result<(), protocol::ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;
    debug!(request = ?request, "received request");

    let response = handle_request(request, ctx).await;
    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await
}

/// Dispatch a request onto the engine/executor.
async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong {
            ok: ctx.executor.monitor_live(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },

        Request::Execute {
            prefix,
            local_state,
        } => match ctx.engine.start(prefix.as_deref(), local_state) {
            Ok(instance) => {
                let instance_id = instance.id.to_string();
                let current_state = instance.current_state_id.clone().unwrap_or_default();
                // Flows without pause states run straight to completion;
                // flows with them park durably.
                let auto_process = !ctx.engine.flow().has_pause_states();
                ctx.executor.execute_async(
                    &ctx.engine,
                    &instance_id,
                    ExecuteOptions {
                        auto_process,
                        ..Default::default()
                    },
                );
                Response::Started {
                    instance_id,
                    current_state,
                }
            }
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },

        Request::Status { instance_id } => match ctx.engine.current_state(&instance_id) {
            Some(current_state) => Response::Status {
                terminal: ctx.engine.is_terminal(&current_state),
                paused: ctx
                    .engine
                    .context(&instance_id)
                    .is_some_and(|c| c.is_paused()),
                current_state,
            },
            None => Response::Error {
                message: format!("unknown instance: {}", instance_id),
            },
        },

        Request::Submit {
            instance_id,
            event_type,
            event_name,
            payload,
        } => {
            let before = ctx.engine.current_state(&instance_id);
            match ctx
                .executor
                .trigger_event(
                    &ctx.engine,
                    &instance_id,
                    &event_type,
                    &event_name,
                    Some(payload),
                )
                .await
            {
                Ok(_) => {
                    // The step rewrote the context without its pause
                    // markers; drop the index entry and drain downstream.
                    ctx.executor.remove_paused_instance(&instance_id);
                    ctx.executor.continue_execution(
                        &ctx.engine,
                        &instance_id,
                        ExecuteOptions::default(),
                    );

                    let current_state = ctx
                        .engine
                        .current_state(&instance_id)
                        .unwrap_or_default();
                    Response::Submitted {
                        transitioned: before.as_deref() != Some(current_state.as_str()),
                        current_state,
                    }
                }
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            }
        }

        Request::ListPaused => {
            let now_ms = rotor_core::Clock::epoch_ms(&SystemClock);
            let instances = ctx
                .executor
                .paused_instances()
                .into_iter()
                .map(|p| PausedEntry {
                    instance_id: p.context_id.to_string(),
                    state_id: p.state_id.clone(),
                    paused_at_ms: p.paused_at_ms,
                    timeout_secs: p.timeout_secs,
                    elapsed_secs: p.elapsed_secs(now_ms),
                })
                .collect();
            Response::Paused { instances }
        }

        Request::Shutdown => {
            info!("shutdown requested");
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
