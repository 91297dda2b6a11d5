//! Endpoint Catalog
//!
//! The chart data service is served from several hosts that speak the
//! same protocol. Connection attempts start at the requested (or
//! default) endpoint and fall back through the rest, each tried once.

use url::Url;

use crate::error::ClientError;

/// Known chart data endpoints, in default fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Primary data host.
    Data,
    /// Host serving paying accounts.
    ProData,
    /// Host backing embedded widgets.
    WidgetData,
    /// Market data service host.
    Mds,
}

impl Endpoint {
    /// All endpoints in default fallback order.
    pub const ALL: [Self; 4] = [Self::Data, Self::ProData, Self::WidgetData, Self::Mds];

    /// Short name used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::ProData => "prodata",
            Self::WidgetData => "widgetdata",
            Self::Mds => "mds",
        }
    }

    /// WebSocket URL for this endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        format!("wss://{}.tradingview.com/socket.io/websocket", self.as_str())
    }

    /// Parse a short endpoint name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for an unknown name.
    pub fn parse(name: &str) -> Result<Self, ClientError> {
        match name.to_lowercase().as_str() {
            "data" => Ok(Self::Data),
            "prodata" => Ok(Self::ProData),
            "widgetdata" => Ok(Self::WidgetData),
            "mds" => Ok(Self::Mds),
            other => Err(ClientError::Validation(format!(
                "unknown endpoint '{other}': expected one of data, prodata, widgetdata, mds"
            ))),
        }
    }
}

/// How the caller wants the connection endpoint chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndpointSelector {
    /// Default fallback order starting at [`Endpoint::Data`].
    #[default]
    Default,
    /// A named endpoint first, then the remaining catalog.
    Named(Endpoint),
    /// An explicit WebSocket URL, tried alone with no fallback.
    Url(String),
}

impl EndpointSelector {
    /// Build a selector from a raw URL, validating its scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] when the URL does not parse or
    /// is not `wss`/`ws`.
    pub fn from_url(raw: &str) -> Result<Self, ClientError> {
        let parsed = Url::parse(raw)
            .map_err(|err| ClientError::Validation(format!("invalid endpoint url: {err}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ClientError::Validation(format!(
                "endpoint url must be ws or wss, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self::Url(raw.to_string()))
    }

    /// Connection URLs to attempt, in order, each exactly once.
    ///
    /// A raw URL override is tried alone; the named catalog is never
    /// used as its fallback, since an explicit URL usually points at a
    /// host the catalog cannot substitute for.
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        match self {
            Self::Default => Endpoint::ALL.iter().map(Endpoint::url).collect(),
            Self::Named(first) => {
                let mut urls = vec![first.url()];
                urls.extend(
                    Endpoint::ALL
                        .iter()
                        .filter(|e| *e != first)
                        .map(Endpoint::url),
                );
                urls
            }
            Self::Url(raw) => vec![raw.clone()],
        }
    }
}
