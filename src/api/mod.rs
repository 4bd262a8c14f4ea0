//! Read-only query API over the routing table.
//!
//! # Routes
//! ```text
//! GET /health            → lifecycle phase (503 unless running)
//! GET /status            → node identity, endpoint, peer counts
//! GET /peers             → routing table snapshot
//! GET /peers/{address}   → one peer (400 malformed, 404 unknown)
//! ```
//!
//! Everything but `/health` requires `Authorization: Bearer <api_key>` when a
//! key is configured.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::discovery::RoutingTable;
use crate::error::TaskError;
use crate::lifecycle::{Phase, Service};
use crate::network::TransportKind;

pub const QUERY_API_TASK: &str = "query-api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Static facts about this node, fixed at startup.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub address: Address,
    pub endpoint: String,
    pub transport_kind: TransportKind,
    pub protocol_version: String,
    pub static_peers: usize,
}

/// Shared handler state. The routing table is injected, never global.
#[derive(Clone)]
pub struct ApiState {
    pub table: RoutingTable,
    pub node: Arc<NodeInfo>,
    pub phase: watch::Receiver<Phase>,
    pub api_key: Option<Arc<str>>,
}

impl ApiState {
    pub fn new(
        table: RoutingTable,
        node: NodeInfo,
        phase: watch::Receiver<Phase>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            table,
            node: Arc::new(node),
            phase,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }
}

#[allow(deprecated)]
pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/status", get(handlers::get_status))
        .route("/peers", get(handlers::get_peers))
        .route("/peers/{address}", get(handlers::get_peer))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::get_health))
        .merge(protected)
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// The query API as a supervised service.
pub struct QueryApi {
    bind: SocketAddr,
    state: ApiState,
}

impl QueryApi {
    pub fn new(bind: SocketAddr, state: ApiState) -> Self {
        Self { bind, state }
    }

    /// Serve on an already-bound listener until `token` is cancelled.
    pub async fn serve(&self, listener: TcpListener, token: CancellationToken) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Query API listening");

        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        tracing::info!("Query API stopped");
        Ok(())
    }
}

#[async_trait]
impl Service for QueryApi {
    fn name(&self) -> &'static str {
        QUERY_API_TASK
    }

    async fn run(&self, token: CancellationToken) -> Result<(), TaskError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|e| TaskError::failed(QUERY_API_TASK, format!("bind {}: {}", self.bind, e)))?;
        self.serve(listener, token)
            .await
            .map_err(|e| TaskError::failed(QUERY_API_TASK, e))
    }
}
