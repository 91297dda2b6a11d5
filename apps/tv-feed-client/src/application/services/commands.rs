//! Session Command Issuance
//!
//! Thin, typed wrappers over the session-scoped protocol commands. Each
//! method encodes exactly one wire command; parameter order and the odd
//! placeholder strings are part of the protocol and fixed here so the
//! orchestrators never build raw parameter lists.

use serde_json::{Value, json};

use crate::application::ports::ChartGateway;
use crate::domain::session::SeriesHandles;
use crate::error::ClientError;

/// Adjustment mode requested during symbol resolution.
const SPLIT_ADJUSTMENT: &str = "splits";

/// Command issuer bound to one gateway.
pub struct SessionCommands<'g, G: ChartGateway + ?Sized> {
    gateway: &'g G,
}

impl<'g, G: ChartGateway + ?Sized> SessionCommands<'g, G> {
    /// Bind a command issuer to a gateway.
    #[must_use]
    pub const fn new(gateway: &'g G) -> Self {
        Self { gateway }
    }

    /// Authenticate the connection. Must be the first command sent.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's send failure.
    pub async fn set_auth_token(&self, token: &str) -> Result<(), ClientError> {
        self.gateway.send("set_auth_token", vec![json!(token)]).await
    }

    /// Open a chart session. The trailing empty string is required by the
    /// server even though it carries no meaning.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's send failure.
    pub async fn chart_create_session(&self, session: &str) -> Result<(), ClientError> {
        self.gateway
            .send("chart_create_session", vec![json!(session), json!("")])
            .await
    }

    /// Resolve a symbol under a fresh symbol handle.
    ///
    /// The symbol itself travels as a `=`-prefixed JSON object selecting
    /// split adjustment.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's send failure.
    pub async fn resolve_symbol(
        &self,
        session: &str,
        symbol_handle: &str,
        symbol: &str,
    ) -> Result<(), ClientError> {
        let descriptor = format!(
            "={}",
            json!({ "symbol": symbol, "adjustment": SPLIT_ADJUSTMENT })
        );
        self.gateway
            .send(
                "resolve_symbol",
                vec![json!(session), json!(symbol_handle), json!(descriptor)],
            )
            .await
    }

    /// Create a series over a resolved symbol, triggering the first batch.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's send failure.
    pub async fn create_series(
        &self,
        session: &str,
        handles: &SeriesHandles,
        timeframe: &str,
        batch: u64,
    ) -> Result<(), ClientError> {
        self.gateway
            .send(
                "create_series",
                vec![
                    json!(session),
                    json!(handles.series_group),
                    json!(handles.series_id),
                    json!(handles.symbol_handle),
                    json!(timeframe),
                    json!(batch),
                    json!(""),
                ],
            )
            .await
    }

    /// Repoint an existing series at a newly resolved symbol handle,
    /// triggering a fresh first batch without a new session.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's send failure.
    pub async fn modify_series(
        &self,
        session: &str,
        handles: &SeriesHandles,
        timeframe: &str,
        symbol_handle: &str,
    ) -> Result<(), ClientError> {
        self.gateway
            .send(
                "modify_series",
                vec![
                    json!(session),
                    json!(handles.series_group),
                    json!(handles.series_id),
                    json!(symbol_handle),
                    json!(timeframe),
                    json!(""),
                ],
            )
            .await
    }

    /// Request the next pagination batch for a session's series.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's send failure.
    pub async fn request_more_data(
        &self,
        session: &str,
        series_group: &str,
        batch: u64,
    ) -> Result<(), ClientError> {
        self.gateway
            .send(
                "request_more_data",
                vec![json!(session), json!(series_group), json!(batch)],
            )
            .await
    }
}

/// Parameter list helper shared by tests.
#[cfg(test)]
pub(crate) fn params_of(method: &str, sent: &[(String, Vec<Value>)]) -> Vec<Value> {
    sent.iter()
        .find(|(m, _)| m == method)
        .map(|(_, p)| p.clone())
        .unwrap_or_default()
}
