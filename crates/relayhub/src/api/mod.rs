//! HTTP API module.
//!
//! Read-only status endpoints plus the WebSocket upgrade route.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{AgentStatus, HealthResponse, StatsResponse};
pub use routes::create_router;
pub use state::AppState;
