//! Wire types for relayhub.
//!
//! Controllers and agents exchange JSON text frames with the hub:
//!
//! ```text
//! Controller --[cmd / fs / readfile / get_file]--> Hub --[cmd / fs / readfile]--> Agent
//! Controller <--[*_response, correlated by id]---- Hub <--[*_response + request_id]-- Agent
//! ```
//!
//! Every inbound frame carries a `type` field that selects one of a closed set of
//! [`MessageKind`]s. Outbound frames are [`OutboundMessage`]s, tagged the same way.

pub mod commands;
pub mod events;

pub use commands::{
    AgentAuth, AgentQuery, AgentResponse, CommandNotice, DataNotice, DecodeError, Decoded,
    ForwardRequest, InboundMessage, KeylogReport, MessageKind, StatusNotice, decode,
};
pub use events::{OutboundMessage, encode};
