use alloy::primitives::Address;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::api::ApiState;
use crate::discovery::PeerView;
use crate::lifecycle::Phase;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub phase: &'static str,
}

#[derive(Debug, Serialize)]
pub struct NodeStatus {
    pub version: &'static str,
    pub phase: &'static str,
    pub address: Address,
    pub endpoint: String,
    pub transport: String,
    pub protocol_version: String,
    pub peers: usize,
    pub candidates: usize,
    pub static_peers: usize,
}

pub async fn get_health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let phase = *state.phase.borrow();
    let (code, status) = match phase {
        Phase::Running => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };
    (
        code,
        Json(HealthResponse {
            status,
            phase: phase.as_str(),
        }),
    )
}

pub async fn get_status(State(state): State<ApiState>) -> Json<NodeStatus> {
    let phase = *state.phase.borrow();
    let node = &state.node;
    Json(NodeStatus {
        version: env!("CARGO_PKG_VERSION"),
        phase: phase.as_str(),
        address: node.address,
        endpoint: node.endpoint.clone(),
        transport: node.transport_kind.to_string(),
        protocol_version: node.protocol_version.clone(),
        peers: state.table.len(),
        candidates: state.table.candidate_count(),
        static_peers: node.static_peers,
    })
}

pub async fn get_peers(State(state): State<ApiState>) -> Json<Vec<PeerView>> {
    Json(state.table.snapshot().iter().map(PeerView::from).collect())
}

pub async fn get_peer(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<PeerView>, StatusCode> {
    let address: Address = address.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    state
        .table
        .get(&address)
        .map(|entry| Json(PeerView::from(&entry)))
        .ok_or(StatusCode::NOT_FOUND)
}
