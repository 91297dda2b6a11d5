//! Configuration

/// Environment-driven settings and their mapping to connect options.
pub mod settings;

pub use settings::{ConfigError, FeedSettings};
