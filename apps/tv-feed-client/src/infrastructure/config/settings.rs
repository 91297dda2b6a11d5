//! Environment Settings
//!
//! All configuration comes from `TV_`-prefixed environment variables,
//! with a `.env` file honored when present. Every variable is optional;
//! the empty configuration connects anonymously to the default endpoint.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TV_SESSION_ID` | `sessionid` browser cookie |
//! | `TV_SESSION_SIGN` | `sessionid_sign` browser cookie |
//! | `TV_ENDPOINT` | named endpoint (`data`, `prodata`, `widgetdata`, `mds`) |
//! | `TV_ENDPOINT_URL` | raw WebSocket URL, overrides `TV_ENDPOINT` |
//! | `TV_CONNECT_TIMEOUT_SECS` | per-endpoint connect budget in seconds |

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::infrastructure::tradingview::auth::SessionCredentials;
use crate::infrastructure::tradingview::connector::ConnectOptions;
use crate::infrastructure::tradingview::endpoints::{Endpoint, EndpointSelector};

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set to a value that does not parse.
    #[error("invalid value for {variable}: {message}")]
    Invalid {
        /// Offending variable name.
        variable: String,
        /// What was wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn invalid(variable: &str, message: impl ToString) -> Self {
        Self::Invalid {
            variable: variable.to_string(),
            message: message.to_string(),
        }
    }
}

/// Settings resolved from the environment.
#[derive(Debug, Clone, Default)]
pub struct FeedSettings {
    /// Credentials assembled from the cookie variables, when set.
    pub credentials: Option<SessionCredentials>,
    /// Endpoint selection.
    pub endpoint: EndpointSelector,
    /// Connect budget override.
    pub connect_timeout: Option<Duration>,
}

impl FeedSettings {
    /// Load settings from the environment, honoring a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a set variable fails to
    /// parse. Unset variables are never errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let credentials = get("TV_SESSION_ID")
            .filter(|id| !id.is_empty())
            .map(|id| SessionCredentials::new(id, get("TV_SESSION_SIGN").filter(|s| !s.is_empty())));

        let endpoint = if let Some(url) = get("TV_ENDPOINT_URL").filter(|u| !u.is_empty()) {
            EndpointSelector::from_url(&url)
                .map_err(|err| ConfigError::invalid("TV_ENDPOINT_URL", err))?
        } else if let Some(name) = get("TV_ENDPOINT").filter(|n| !n.is_empty()) {
            EndpointSelector::Named(
                Endpoint::parse(&name).map_err(|err| ConfigError::invalid("TV_ENDPOINT", err))?,
            )
        } else {
            EndpointSelector::Default
        };

        let connect_timeout = get("TV_CONNECT_TIMEOUT_SECS")
            .filter(|v| !v.is_empty())
            .map(|raw| {
                raw.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|err| ConfigError::invalid("TV_CONNECT_TIMEOUT_SECS", err))
            })
            .transpose()?;

        Ok(Self {
            credentials,
            endpoint,
            connect_timeout,
        })
    }
}

impl From<FeedSettings> for ConnectOptions {
    fn from(settings: FeedSettings) -> Self {
        let defaults = Self::default();
        Self {
            credentials: settings.credentials,
            endpoint: settings.endpoint,
            connect_timeout: settings.connect_timeout.unwrap_or(defaults.connect_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_is_fully_defaulted() {
        let settings = FeedSettings::from_lookup(|_| None).unwrap();
        assert!(settings.credentials.is_none());
        assert_eq!(settings.endpoint, EndpointSelector::Default);
        assert!(settings.connect_timeout.is_none());

        let options: ConnectOptions = settings.into();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn cookie_pair_becomes_credentials() {
        let settings = FeedSettings::from_lookup(lookup(&[
            ("TV_SESSION_ID", "sid"),
            ("TV_SESSION_SIGN", "sign"),
        ]))
        .unwrap();
        let creds = settings.credentials.unwrap();
        assert_eq!(creds.session_id, "sid");
        assert_eq!(creds.signature.as_deref(), Some("sign"));
    }

    #[test]
    fn signature_alone_is_ignored() {
        let settings =
            FeedSettings::from_lookup(lookup(&[("TV_SESSION_SIGN", "sign")])).unwrap();
        assert!(settings.credentials.is_none());
    }

    #[test]
    fn url_override_beats_named_endpoint() {
        let settings = FeedSettings::from_lookup(lookup(&[
            ("TV_ENDPOINT", "prodata"),
            ("TV_ENDPOINT_URL", "wss://example.com/socket"),
        ]))
        .unwrap();
        assert_eq!(
            settings.endpoint,
            EndpointSelector::Url("wss://example.com/socket".into())
        );
    }

    #[test]
    fn named_endpoint_is_parsed() {
        let settings =
            FeedSettings::from_lookup(lookup(&[("TV_ENDPOINT", "widgetdata")])).unwrap();
        assert_eq!(
            settings.endpoint,
            EndpointSelector::Named(Endpoint::WidgetData)
        );
    }

    #[test]
    fn bad_values_are_reported_with_the_variable() {
        let err = FeedSettings::from_lookup(lookup(&[("TV_ENDPOINT", "primary")])).unwrap_err();
        assert!(matches!(&err, ConfigError::Invalid { variable, .. } if variable == "TV_ENDPOINT"));

        let err = FeedSettings::from_lookup(lookup(&[("TV_CONNECT_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(format!("{err}").contains("TV_CONNECT_TIMEOUT_SECS"));
    }
}
