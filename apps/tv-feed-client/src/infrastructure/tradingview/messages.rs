//! Wire Message Shapes
//!
//! A decoded frame is one of three things: a keepalive to echo, the
//! one-time handshake that opens the session, or an application event.

use serde::Deserialize;

use crate::domain::event::ChartEvent;

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keepalive payload (`~h~N`), echoed back verbatim.
    Keepalive(String),
    /// First JSON frame on a fresh connection.
    Handshake(Handshake),
    /// Application event (`{m, p}`).
    Event(ChartEvent),
}

/// Server handshake payload. Only the session id matters to the client;
/// the rest is advisory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Handshake {
    /// Server-assigned socket session identifier.
    pub session_id: String,
    /// Reported server release, when present.
    #[serde(default)]
    pub release: Option<String>,
    /// Reported timezone offset in minutes, when present.
    #[serde(default)]
    pub timezone_offset: Option<i32>,
}
