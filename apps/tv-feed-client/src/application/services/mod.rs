//! Retrieval Services

/// Typed wrappers over the session-scoped protocol commands.
pub mod commands;

/// Sequential and concurrent candle fetch orchestration.
pub mod fetch;

/// Streaming delivery of per-symbol results.
pub mod stream;
