//! Transport startup.
//!
//! # Responsibilities
//! - Issue exactly one long-lived `run` call for the transport
//! - Block the caller until the transport reports readiness
//!
//! # Design Decisions
//! - The run call lives in the supervised task group, so it keeps serving after readiness
//! - Cancellation before readiness is a cancellation outcome, not an error
//! - A run call that exits before readiness surfaces its own error

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::lifecycle::supervisor::TaskGroup;
use crate::network::{Transport, TransportError};

/// Task name of the transport's run loop.
pub const TRANSPORT_TASK: &str = "transport";

/// Start `transport` inside `group` and wait until it is accepting connections.
pub async fn ensure_running(
    transport: Arc<dyn Transport>,
    group: &mut TaskGroup,
    token: &CancellationToken,
) -> Result<SocketAddr, TaskError> {
    let runner = transport.clone();
    let run_token = token.clone();
    group.spawn(TRANSPORT_TASK, async move {
        runner.run(run_token).await.map_err(|e| match e {
            TransportError::Cancelled => TaskError::Cancelled,
            e => TaskError::failed(TRANSPORT_TASK, e),
        })
    });

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(TaskError::Cancelled),
        ready = transport.await_ready() => match ready {
            Ok(addr) => {
                tracing::info!(local = %addr, "Transport ready");
                Ok(addr)
            }
            // The run task holds the real cause.
            Err(e) => match group.join_next().await {
                Some(Err(err)) => Err(err),
                _ => Err(TaskError::failed(TRANSPORT_TASK, e)),
            },
        },
        exited = group.join_next() => match exited {
            Some(Err(err)) => Err(err),
            _ => Err(TaskError::failed(TRANSPORT_TASK, "exited before becoming ready")),
        },
    }
}
