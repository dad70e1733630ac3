//! OAuth client configuration.
//!
//! The client identity comes from the environment (`GOOGLE_CLIENT_ID`,
//! `GOOGLE_CLIENT_SECRET`, optional `GOOGLE_REDIRECT_PORT`). Users register
//! their own desktop OAuth client in the Google Cloud Console.

use std::fmt;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Environment variable holding the OAuth client id.
pub const CLIENT_ID_VAR: &str = "GOOGLE_CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const CLIENT_SECRET_VAR: &str = "GOOGLE_CLIENT_SECRET";
/// Environment variable holding the loopback redirect port.
pub const REDIRECT_PORT_VAR: &str = "GOOGLE_REDIRECT_PORT";

/// Loopback port used when none is configured.
pub const DEFAULT_REDIRECT_PORT: u16 = 53682;

/// Lowest accepted redirect port (start of the registered/dynamic range).
pub const MIN_REDIRECT_PORT: u16 = 1024;

/// Path the loopback server answers the OAuth redirect on.
pub const CALLBACK_PATH: &str = "/oauth2callback";

/// Read/write access to calendars, required to create watch channels.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Google OAuth endpoints.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// OAuth 2.0 client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Everything needed to talk to Google on behalf of the user.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// OAuth client identity.
    pub credentials: OAuthCredentials,
    /// Loopback port for the login redirect.
    pub redirect_port: u16,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Calendar API base URL.
    pub api_base: String,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl ClientSettings {
    /// Default HTTP timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates settings pointing at the real Google endpoints.
    pub fn new(credentials: OAuthCredentials, redirect_port: u16) -> Self {
        Self {
            credentials,
            redirect_port,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: CALENDAR_API_BASE.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads the client configuration from the process environment.
    pub fn from_env() -> ApiResult<Self> {
        let var = |name: &str| std::env::var(name).ok();
        Self::from_values(
            var(CLIENT_ID_VAR).as_deref(),
            var(CLIENT_SECRET_VAR).as_deref(),
            var(REDIRECT_PORT_VAR).as_deref(),
        )
    }

    /// Validates raw configuration values.
    ///
    /// Blank values count as missing. The port defaults to
    /// [`DEFAULT_REDIRECT_PORT`] and must lie in `1024..=65535`.
    pub fn from_values(
        client_id: Option<&str>,
        client_secret: Option<&str>,
        redirect_port: Option<&str>,
    ) -> ApiResult<Self> {
        let present = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let (Some(client_id), Some(client_secret)) = (present(client_id), present(client_secret))
        else {
            return Err(ApiError::configuration(format!(
                "Missing {} or {} environment variables.",
                CLIENT_ID_VAR, CLIENT_SECRET_VAR
            )));
        };

        let redirect_port = parse_redirect_port(redirect_port)?;

        Ok(Self::new(
            OAuthCredentials::new(client_id, client_secret),
            redirect_port,
        ))
    }

    /// The redirect URI registered for the loopback flow.
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.redirect_port)
    }

    /// Overrides the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Overrides the authorization endpoint.
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Overrides the Calendar API base URL.
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }
}

/// Builds `http://127.0.0.1:<port>/oauth2callback`.
pub fn redirect_uri_for(port: u16) -> String {
    format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH)
}

/// Parses the redirect port, applying the default when unset or blank.
pub fn parse_redirect_port(raw: Option<&str>) -> ApiResult<u16> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_REDIRECT_PORT),
        Some(raw) => raw,
    };

    raw.parse::<u32>()
        .ok()
        .and_then(|port| u16::try_from(port).ok())
        .filter(|port| *port >= MIN_REDIRECT_PORT)
        .ok_or_else(|| {
            ApiError::configuration(format!(
                "{} must be an integer between {} and 65535 (got '{}')",
                REDIRECT_PORT_VAR, MIN_REDIRECT_PORT, raw
            ))
        })
}
