//! TradingView Transport
//!
//! Everything that touches the wire: frame codec, endpoint catalog with
//! fallback order, credential exchange, and the WebSocket connector that
//! owns the read task.

/// Frame classification types.
pub mod messages;

/// Length-prefixed frame encoding and decoding.
pub mod codec;

/// Endpoint catalog and fallback selection.
pub mod endpoints;

/// Credential exchange and token resolution.
pub mod auth;

/// WebSocket connector and the live connection handle.
pub mod connector;
