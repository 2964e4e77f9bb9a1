//! Correlation table for requests that are waiting on an agent.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use relayhub_protocol::MessageKind;
use serde_json::Value;

use super::connection::{ConnectionHandle, ConnectionId};
use super::error::{RelayError, RelayResult};

/// What the requester originally asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginalRequest {
    pub agent: String,
    pub kind: MessageKind,
    pub data: Value,
}

/// Context needed to route an agent's response back to its requester.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub request_id: String,
    pub requester: ConnectionHandle,
    pub original: OriginalRequest,
    /// Connection the request was forwarded on.
    pub agent_connection: ConnectionId,
    pub created_at: Instant,
}

impl PendingRequest {
    pub fn new(
        request_id: String,
        requester: ConnectionHandle,
        original: OriginalRequest,
        agent_connection: ConnectionId,
    ) -> Self {
        Self {
            request_id,
            requester,
            original,
            agent_connection,
            created_at: Instant::now(),
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Request id -> pending request.
///
/// `take` is a single atomic remove, so of several concurrent responses carrying
/// the same id exactly one gets the entry.
#[derive(Default)]
pub struct PendingRequests {
    requests: DashMap<String, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new correlation entry. Fails if the id is already outstanding.
    pub fn create(&self, request: PendingRequest) -> RelayResult<()> {
        match self.requests.entry(request.request_id.clone()) {
            Entry::Occupied(entry) => Err(RelayError::DuplicateRequestId(entry.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    /// Remove and return the entry for `request_id`.
    pub fn take(&self, request_id: &str) -> Option<PendingRequest> {
        self.requests.remove(request_id).map(|(_, request)| request)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Remove every entry issued by `requester`.
    pub fn take_for_requester(&self, requester: ConnectionId) -> Vec<PendingRequest> {
        self.take_matching(|request| request.requester.id() == requester)
    }

    /// Remove every entry forwarded on `agent_connection`.
    pub fn take_for_agent(&self, agent_connection: ConnectionId) -> Vec<PendingRequest> {
        self.take_matching(|request| request.agent_connection == agent_connection)
    }

    /// Remove every entry older than `ttl` at `now`.
    pub fn take_expired(&self, ttl: Duration, now: Instant) -> Vec<PendingRequest> {
        self.take_matching(|request| request.age(now) >= ttl)
    }

    fn take_matching<F>(&self, predicate: F) -> Vec<PendingRequest>
    where
        F: Fn(&PendingRequest) -> bool,
    {
        let ids: Vec<String> = self
            .requests
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        // An entry may have been taken by a response in between; `take` settles it.
        let taken: Vec<PendingRequest> = ids.iter().filter_map(|id| self.take(id)).collect();
        if !taken.is_empty() {
            debug!("Removed {} pending request(s)", taken.len());
        }
        taken
    }
}
