//! Credential Exchange
//!
//! A browser session cookie pair is exchanged for a short-lived auth
//! token by scraping the token out of the main site's HTML. Connecting
//! without credentials, or with credentials the exchange rejects, falls
//! back to the anonymous token the server accepts for free data.

use std::fmt;

use tracing::warn;

use crate::error::ClientError;

/// Token accepted for anonymous access.
pub const UNAUTHORIZED_TOKEN: &str = "unauthorized_user_token";

/// Page the auth token is scraped from.
const TOKEN_PAGE: &str = "https://www.tradingview.com/";

/// Marker preceding the token in the page HTML.
const TOKEN_MARKER: &str = "\"auth_token\":\"";

/// Browser session cookie pair.
///
/// The signature is optional; accounts created before signed sessions
/// only carry the id.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    /// `sessionid` cookie value.
    pub session_id: String,
    /// `sessionid_sign` cookie value, when the account has one.
    pub signature: Option<String>,
}

impl SessionCredentials {
    /// Build credentials from the cookie pair.
    #[must_use]
    pub fn new(session_id: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            signature,
        }
    }

    fn cookie_header(&self) -> String {
        match &self.signature {
            Some(sign) => format!("sessionid={}; sessionid_sign={sign}", self.session_id),
            None => format!("sessionid={}", self.session_id),
        }
    }
}

// Credentials are secrets; never let them reach logs through Debug.
impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("session_id", &"<redacted>")
            .field("signature", &self.signature.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Exchange a session cookie pair for an auth token.
///
/// # Errors
///
/// Returns [`ClientError::Authentication`] when the request fails, the
/// server answers with an error status, or the page carries no token
/// (expired or invalid cookies).
pub async fn exchange_auth_token(
    credentials: &SessionCredentials,
) -> Result<String, ClientError> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|err| ClientError::Authentication(format!("http client: {err}")))?;

    let response = client
        .get(TOKEN_PAGE)
        .header(reqwest::header::COOKIE, credentials.cookie_header())
        .send()
        .await
        .map_err(|err| ClientError::Authentication(format!("token exchange request: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Authentication(format!(
            "token exchange answered {status}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|err| ClientError::Authentication(format!("token exchange body: {err}")))?;

    extract_token(&body).ok_or_else(|| {
        ClientError::Authentication("no auth token in response; session may be expired".into())
    })
}

/// Pull the auth token out of the page HTML.
fn extract_token(body: &str) -> Option<String> {
    let start = body.find(TOKEN_MARKER)? + TOKEN_MARKER.len();
    let rest = body.get(start..)?;
    let end = rest.find('"')?;
    let token = &rest[..end];
    if token.is_empty() { None } else { Some(token.to_string()) }
}

/// Resolve the token to authenticate a connection with.
///
/// Missing credentials or a failed exchange downgrade to the anonymous
/// token with a warning rather than failing the connection.
pub async fn resolve_auth_token(credentials: Option<&SessionCredentials>) -> String {
    match credentials {
        None => UNAUTHORIZED_TOKEN.to_string(),
        Some(creds) => match exchange_auth_token(creds).await {
            Ok(token) => token,
            Err(err) => {
                warn!(%err, "credential exchange failed, connecting anonymously");
                UNAUTHORIZED_TOKEN.to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_extracted_from_page_html() {
        let body = r#"<script>window.user = {"id":1,"auth_token":"abc.def.ghi","name":"x"};</script>"#;
        assert_eq!(extract_token(body).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_or_empty_token_yields_none() {
        assert_eq!(extract_token("<html>no token here</html>"), None);
        assert_eq!(extract_token(r#"{"auth_token":""}"#), None);
    }

    #[test]
    fn debug_output_redacts_cookies() {
        let creds = SessionCredentials::new("secret-id", Some("secret-sign".into()));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-id"));
        assert!(!debug.contains("secret-sign"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn cookie_header_omits_absent_signature() {
        let without = SessionCredentials::new("id", None);
        assert_eq!(without.cookie_header(), "sessionid=id");

        let with = SessionCredentials::new("id", Some("sig".into()));
        assert_eq!(with.cookie_header(), "sessionid=id; sessionid_sign=sig");
    }

    #[tokio::test]
    async fn no_credentials_resolve_to_anonymous() {
        assert_eq!(resolve_auth_token(None).await, UNAUTHORIZED_TOKEN);
    }
}
