//! Domain layer - Protocol-independent retrieval logic.
//!
//! Everything here is pure state and transitions: no sockets, no HTTP,
//! no clocks. The infrastructure layer feeds events in; the application
//! layer acts on what comes out.

/// Application events parsed off the wire.
pub mod event;

/// OHLCV bars and the per-symbol retrieval state machine.
pub mod candle;

/// Session identifier minting and the session-to-symbol registry.
pub mod session;

/// Caller-input validation (symbols, timeframe, amount).
pub mod validate;
