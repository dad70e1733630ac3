//! Authorized session: stored credentials plus lazy access-token refresh.

use chrono::Utc;
use gcalwebhook_core::DocumentStore;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ClientSettings;
use crate::error::{ApiError, ApiErrorCode, ApiResult};
use crate::oauth::OAuthClient;
use crate::tokens::{Credentials, TokenStore};

/// Shown when no usable token file exists.
pub const NO_CREDENTIALS_MESSAGE: &str =
    "No stored credentials found. Run `gcalendar-webhook-cli login` first.";

/// Credentials loaded from disk, refreshed on demand.
#[derive(Debug)]
pub struct Session<S> {
    oauth: OAuthClient,
    tokens: TokenStore<S>,
    credentials: Mutex<Credentials>,
}

impl<S: DocumentStore> Session<S> {
    /// Loads the stored credentials.
    ///
    /// Fails when the token file is absent or carries neither an access
    /// token nor a refresh token.
    pub fn load(settings: &ClientSettings, tokens: TokenStore<S>) -> ApiResult<Self> {
        let credentials = tokens
            .load()?
            .filter(Credentials::has_any_token)
            .ok_or_else(|| ApiError::authentication(NO_CREDENTIALS_MESSAGE))?;
        debug!(
            path = %tokens.path().display(),
            has_refresh_token = credentials.refresh().is_some(),
            "loaded credentials"
        );

        Ok(Self {
            oauth: OAuthClient::new(settings)?,
            tokens,
            credentials: Mutex::new(credentials),
        })
    }

    /// Returns an access token, refreshing it first when it is missing or
    /// about to expire. Refreshed credentials are written back to disk.
    pub async fn access_token(&self) -> ApiResult<String> {
        let mut credentials = self.credentials.lock().await;

        if credentials.needs_refresh(Utc::now().timestamp_millis()) {
            if let Some(refresh_token) = credentials.refresh().map(str::to_string) {
                info!("access token missing or expiring, refreshing");
                let update = self
                    .oauth
                    .refresh_token(&refresh_token)
                    .await
                    .map_err(rejected_refresh)?;
                let merged = credentials.merged_with(update);
                self.tokens.save(&merged)?;
                *credentials = merged;
            }
        }

        credentials
            .access()
            .map(str::to_string)
            .ok_or_else(|| ApiError::authentication(NO_CREDENTIALS_MESSAGE))
    }
}

/// Points the user back to `login` when Google refuses the refresh token.
fn rejected_refresh(err: ApiError) -> ApiError {
    if err.code() != ApiErrorCode::AuthenticationFailed {
        return err;
    }
    ApiError::authentication(format!(
        "Stored refresh token was rejected ({}). Run `gcalendar-webhook-cli login` again.",
        err.message()
    ))
    .with_source(err)
}
