//! Application Events
//!
//! A `ChartEvent` is one `{m, p}` message decoded from the wire: a method
//! name plus an ordered, untyped parameter list. Events are immutable once
//! constructed and are broadcast as-is to every subscriber.

use serde_json::Value;

/// Method names the retrieval core reacts to.
pub mod method {
    /// Historical bar batch for a chart session.
    pub const TIMESCALE_UPDATE: &str = "timescale_update";
    /// The server finished sending the current batch.
    pub const SERIES_COMPLETED: &str = "series_completed";
    /// Symbol resolution or series creation failed server-side.
    pub const SYMBOL_ERROR: &str = "symbol_error";
}

/// One decoded application event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartEvent {
    /// Method name (the `m` field).
    pub name: String,
    /// Ordered parameters (the `p` field).
    pub params: Vec<Value>,
}

impl ChartEvent {
    /// Create an event from a method name and parameter list.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Session identifier this event is addressed to, when present.
    ///
    /// Every session-scoped method puts the session id in the first
    /// parameter slot.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.params.first().and_then(Value::as_str)
    }
}
