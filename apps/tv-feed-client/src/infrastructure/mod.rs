//! Infrastructure layer - Transport, dispatch, config, telemetry.

/// TradingView wire protocol: codec, endpoints, auth, connector.
pub mod tradingview;

/// Event fan-out between the read task and subscribers.
pub mod dispatch;

/// Environment-driven configuration.
pub mod config;

/// Tracing subscriber setup.
pub mod telemetry;
