//! OAuth 2.0 authorization code flow with PKCE for Google APIs.
//!
//! [`PkceFlow`] produces the verifier/challenge pair and the consent URL.
//! [`OAuthClient`] talks to the token endpoint, both to redeem an
//! authorization code and to refresh an access token. The loopback side of
//! the flow lives in [`crate::login`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::client::BoxFuture;
use crate::config::{CALENDAR_SCOPE, ClientSettings, OAuthCredentials};
use crate::error::{ApiError, ApiResult};
use crate::tokens::Credentials;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// The authorization server side of the login flow.
///
/// Implemented by [`OAuthClient`]; tests substitute their own.
pub trait TokenExchange: Send + Sync {
    /// Builds the consent URL for `pkce`, redirecting to `redirect_uri`.
    fn authorization_url(&self, pkce: &PkceFlow, redirect_uri: &str) -> String;

    /// Exchanges `code` (issued for `redirect_uri`) and the PKCE verifier for tokens.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, ApiResult<Credentials>>;
}

/// Client for Google's OAuth token endpoint.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    auth_url: String,
    token_url: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a client for the endpoints in `settings`.
    pub fn new(settings: &ClientSettings) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                ApiError::internal(format!("failed to create HTTP client: {}", e)).with_source(e)
            })?;

        Ok(Self {
            credentials: settings.credentials.clone(),
            auth_url: settings.auth_url.clone(),
            token_url: settings.token_url.clone(),
            http_client,
        })
    }

    /// Obtains a new access token using `refresh_token`.
    pub async fn refresh_token(&self, refresh_token: &str) -> ApiResult<Credentials> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.post_token_form(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok(response.into_credentials(Utc::now().timestamp_millis()))
    }

    async fn redeem_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ApiResult<Credentials> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self.post_token_form(&params, "token exchange").await?;
        info!("obtained tokens");
        Ok(response.into_credentials(Utc::now().timestamp_millis()))
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ApiResult<TokenResponse> {
        debug!(url = %self.token_url, "{} request", what);
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| ApiError::network(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read response: {}", e)))?;

        if status.is_server_error() {
            return Err(ApiError::server(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }
        if !status.is_success() {
            return Err(ApiError::authentication(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::invalid_response(format!("invalid token response: {}", e)))
    }
}

impl TokenExchange for OAuthClient {
    fn authorization_url(&self, pkce: &PkceFlow, redirect_uri: &str) -> String {
        pkce.build_auth_url(
            &self.auth_url,
            &self.credentials.client_id,
            redirect_uri,
            &[CALENDAR_SCOPE],
        )
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, ApiResult<Credentials>> {
        Box::pin(self.redeem_code(code, verifier, redirect_uri))
    }
}

/// PKCE flow state and utilities.
///
/// Implements RFC 7636 (Proof Key for Code Exchange).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with a random verifier.
    pub fn new() -> Self {
        let verifier = Self::generate_verifier();
        let challenge = Self::compute_challenge(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    fn generate_verifier() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..CODE_VERIFIER_LENGTH).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Builds the authorization URL requesting offline access with forced consent,
    /// so Google always returns a refresh token.
    pub fn build_auth_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[&str],
    ) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&\
            access_type=offline&prompt=consent",
            auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credentials(self, now_ms: i64) -> Credentials {
        Credentials {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
            scope: self.scope,
            token_type: self.token_type,
            expiry_date: self.expires_in.map(|secs| now_ms + secs * 1000),
        }
    }
}
