//! relayhub library.
//!
//! A relay hub between controller clients and long-lived agent connections.
//! Controllers send requests naming an agent; the hub forwards them with a fresh
//! correlation id and routes the agent's eventual response back to whoever asked.

pub mod api;
pub mod config;
pub mod relay;
pub mod ws;
