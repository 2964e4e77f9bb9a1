//! Read-only status handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::relay::AgentSummary;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List registered agents.
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentSummary>> {
    Json(state.hub.agents().list())
}

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    #[serde(flatten)]
    pub agent: AgentSummary,
    pub connected: bool,
}

/// Get one registered agent.
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentStatus>> {
    let agent = state
        .hub
        .agents()
        .summary(&agent_id)
        .ok_or_else(|| ApiError::not_found(format!("Agent {agent_id}")))?;

    Ok(Json(AgentStatus {
        agent,
        connected: true,
    }))
}

/// Table sizes.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub agents: usize,
    pub pending_requests: usize,
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        agents: state.hub.agents().len(),
        pending_requests: state.hub.pending().len(),
    })
}
