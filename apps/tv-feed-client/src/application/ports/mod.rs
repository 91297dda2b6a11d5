//! Application Ports
//!
//! The single seam between retrieval logic and the transport: anything
//! that can issue protocol commands and hand out event subscriptions can
//! drive a retrieval, which is what makes the orchestrators testable
//! against a scripted in-memory gateway.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClientError;
use crate::infrastructure::dispatch::EventSubscription;

/// Command and event access to one chart data connection.
#[async_trait]
pub trait ChartGateway: Send + Sync {
    /// Issue one protocol command as a method name plus parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] when the connection is closed
    /// or the write fails.
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError>;

    /// Open an independent subscription over all inbound events.
    ///
    /// Every subscriber sees every event; filtering by session id is the
    /// subscriber's job.
    fn subscribe(&self) -> EventSubscription;
}
