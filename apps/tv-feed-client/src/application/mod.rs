//! Application layer - Use cases and ports.
//!
//! Orchestrates candle retrieval over an abstract gateway. Nothing in
//! this layer knows about WebSockets or wire framing.

/// Port definitions (traits) the infrastructure implements.
pub mod ports;

/// Retrieval services: command issuance, fetch orchestration, streaming.
pub mod services;
