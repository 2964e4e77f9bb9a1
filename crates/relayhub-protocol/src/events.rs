//! Outbound message types.
//!
//! Everything the hub writes to a connection: replies to the sender, requests
//! forwarded to agents, and correlated responses routed back to controllers.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A frame sent by the hub, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    // ========== Direct replies ==========
    /// Any recoverable failure, reported on the connection that caused it.
    Error {
        message: String,
        /// Set when the error concerns a request that was already forwarded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Agent authentication accepted.
    Success { message: String },

    /// Acknowledgement for notices that are not routed anywhere.
    Ack { message: String },

    /// Answer to `get_keys`.
    GetKeysResponse { agent: String, data: String },

    /// Answer to `is_connected`.
    IsConnectedResponse { agent: String, connected: bool },

    /// Sent to the requester once a `get_file` request is on its way.
    GetFilePending {
        agent: String,
        request_id: String,
        file_path: Value,
        message: String,
    },

    // ========== Forwarded to agents ==========
    /// Execute a command line.
    Cmd { request_id: String, data: Value },

    /// List a directory.
    Fs { request_id: String, data: Value },

    /// Read a file.
    Readfile { request_id: String, data: Value },

    /// Take a screenshot. Never correlated, so `request_id` is empty.
    Screenshot { request_id: String, data: Value },

    // ========== Routed back to requesters ==========
    CmdResponse {
        agent: String,
        data: Value,
        original_command: Value,
    },

    FsResponse {
        agent: String,
        data: Value,
        original_path: Value,
    },

    ReadfileResponse {
        agent: String,
        data: Value,
        original_path: Value,
    },

    GetFileResponse {
        agent: String,
        data: Value,
        file_path: Value,
    },

    /// The agent did not answer before the pending request expired.
    RequestTimeout {
        request_id: String,
        agent: String,
        request_type: String,
        message: String,
    },
}

impl OutboundMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            request_id: None,
        }
    }

    pub fn ack(message: impl Into<String>) -> Self {
        Self::Ack {
            message: message.into(),
        }
    }

    /// The wire `type` of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::Success { .. } => "success",
            Self::Ack { .. } => "ack",
            Self::GetKeysResponse { .. } => "get_keys_response",
            Self::IsConnectedResponse { .. } => "is_connected_response",
            Self::GetFilePending { .. } => "get_file_pending",
            Self::Cmd { .. } => "cmd",
            Self::Fs { .. } => "fs",
            Self::Readfile { .. } => "readfile",
            Self::Screenshot { .. } => "screenshot",
            Self::CmdResponse { .. } => "cmd_response",
            Self::FsResponse { .. } => "fs_response",
            Self::ReadfileResponse { .. } => "readfile_response",
            Self::GetFileResponse { .. } => "get_file_response",
            Self::RequestTimeout { .. } => "request_timeout",
        }
    }

    /// Best-effort text rendering of the message body.
    fn data_text(&self) -> String {
        match self {
            Self::Error { message, .. }
            | Self::Success { message }
            | Self::Ack { message }
            | Self::GetFilePending { message, .. }
            | Self::RequestTimeout { message, .. } => message.clone(),
            Self::GetKeysResponse { data, .. } => data.clone(),
            Self::IsConnectedResponse { connected, .. } => connected.to_string(),
            Self::Cmd { data, .. }
            | Self::Fs { data, .. }
            | Self::Readfile { data, .. }
            | Self::Screenshot { data, .. }
            | Self::CmdResponse { data, .. }
            | Self::FsResponse { data, .. }
            | Self::ReadfileResponse { data, .. }
            | Self::GetFileResponse { data, .. } => match data {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
        }
    }
}

/// Encode a message as a text frame.
///
/// A message that fails to serialize is still delivered, as a minimal
/// `{type, error, data}` envelope carrying the stringified body.
pub fn encode(message: &OutboundMessage) -> String {
    match serde_json::to_string(message) {
        Ok(text) => text,
        Err(err) => fallback_envelope(message, &err),
    }
}

fn fallback_envelope(message: &OutboundMessage, err: &serde_json::Error) -> String {
    json!({
        "type": message.type_name(),
        "error": format!("Error serializing full response: {err}"),
        "data": message.data_text(),
    })
    .to_string()
}
