//! Relay core.
//!
//! Brokers request/response exchanges between controllers and agents:
//!
//! ```text
//!  Controller ──cmd{agent,data}──▶ ┌────────────┐ ──cmd{request_id,data}──▶ Agent
//!                                  │  RelayHub  │
//!  Controller ◀──cmd_response───── │  registry  │ ◀──cmd_response{id}────── Agent
//!                                  │  pending   │
//!                                  └────────────┘
//! ```
//!
//! The hub keeps two shared tables: the [`AgentRegistry`] (agent id -> connection)
//! and the [`PendingRequests`] table (request id -> requester). Transports feed it
//! raw frames through [`RelayHub::dispatch`] and report closed connections through
//! [`RelayHub::disconnect`].

mod connection;
mod dispatch;
mod error;
mod handlers;
mod hub;
mod ids;
mod pending;
mod registry;

pub use connection::{
    ConnectionHandle, ConnectionId, ConnectionIds, ConnectionSender, Session, SessionState,
};
pub use error::{RelayError, RelayResult};
pub use hub::RelayHub;
pub use ids::RequestIdStrategy;
pub use pending::{OriginalRequest, PendingRequest, PendingRequests};
pub use registry::{AgentRegistry, AgentSummary};
