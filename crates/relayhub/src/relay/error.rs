//! Relay error types.
//!
//! The `Display` text of each variant is what the offending connection receives in
//! its `{type: "error"}` reply.

use thiserror::Error;

use super::connection::ConnectionId;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Recoverable failures while handling one inbound message.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A required field was absent or empty. Carries the full reply text.
    #[error("{0}")]
    MissingField(&'static str),

    /// The named agent has no live registration.
    #[error("Agent {0} not connected")]
    UnknownAgent(String),

    /// `agent-auth` for an id that is already registered.
    #[error("Agent already connected")]
    AlreadyConnected,

    /// `agent-auth` on a connection that already authenticated.
    #[error("Connection already authenticated as {0}")]
    AlreadyAuthenticated(String),

    /// A generated request id collided with an outstanding one.
    #[error("Request id {0} is already pending")]
    DuplicateRequestId(String),

    /// The peer's outbound queue is gone.
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// The peer's outbound queue is full.
    #[error("Connection {0} is not keeping up")]
    ConnectionBusy(ConnectionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_matches_wire_text() {
        assert_eq!(
            RelayError::UnknownAgent("JC17046684".to_string()).to_string(),
            "Agent JC17046684 not connected"
        );
        assert_eq!(
            RelayError::AlreadyConnected.to_string(),
            "Agent already connected"
        );
        assert_eq!(
            RelayError::MissingField("Missing agent identifier").to_string(),
            "Missing agent identifier"
        );
    }
}
