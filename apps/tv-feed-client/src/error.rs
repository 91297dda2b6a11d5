//! Client Error Taxonomy
//!
//! Every fallible operation in the crate resolves to one of the kinds
//! below. Module-local errors (codec, auth, config) convert into this
//! taxonomy at the boundary where they become caller-visible.

use thiserror::Error;

use crate::infrastructure::tradingview::codec::CodecError;

/// Errors surfaced to callers of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or endpoint failure. Raised only after every fallback
    /// endpoint has been tried, or when an established connection drops
    /// mid-retrieval.
    #[error("connection error: {0}")]
    Connection(String),

    /// Credential exchange failed. Connecting recovers from this by
    /// downgrading to an unauthorized token, so callers only see it when
    /// they invoke the exchange directly.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Bad caller input (symbol, timeframe, or amount). Raised before any
    /// network activity.
    #[error("validation error: {0}")]
    Validation(String),

    /// Parsing or missing-series failure during retrieval, tagged with the
    /// offending symbol.
    #[error("data error for {symbol}: {message}")]
    Data {
        /// Symbol the failure belongs to.
        symbol: String,
        /// Human-readable description of the failure.
        message: String,
    },

    /// A frame that matches none of the recognized wire shapes.
    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// Connection establishment exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl ClientError {
    /// Build a `Data` error tagged with a symbol.
    #[must_use]
    pub fn data(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Data {
            symbol: symbol.into(),
            message: message.into(),
        }
    }

    /// True when the error indicates the connection itself is unusable.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}
