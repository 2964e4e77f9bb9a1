//! WebSocket transport.
//!
//! Every connection is both a potential controller and a potential agent; it
//! becomes an agent by sending `agent-auth`.
//!
//! ```text
//!   socket ──frames──▶ reader loop ──▶ RelayHub::dispatch
//!   socket ◀──text─── writer task ◀── mpsc queue ◀── ConnectionHandle
//! ```

mod handler;

pub use handler::ws_handler;
