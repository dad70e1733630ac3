//! OAuth token persistence.
//!
//! Tokens live in `tokens.json` in the Google token wire shape
//! (`access_token`, `refresh_token`, `scope`, `token_type`, `expiry_date`
//! in epoch milliseconds). Absent fields are omitted.

use std::fmt;
use std::path::PathBuf;

use gcalwebhook_core::{DocumentStore, TOKENS_FILE, read_document, write_document};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiResult;

/// Access tokens closer than this to expiry are refreshed before use.
pub const REFRESH_MARGIN_MS: i64 = 60_000;

/// The persisted credential bundle.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Access token expiry in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl Credentials {
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// The access token, if present and non-empty.
    pub fn access(&self) -> Option<&str> {
        Self::non_empty(&self.access_token)
    }

    /// The refresh token, if present and non-empty.
    pub fn refresh(&self) -> Option<&str> {
        Self::non_empty(&self.refresh_token)
    }

    /// True when at least one token is present.
    pub fn has_any_token(&self) -> bool {
        self.access().is_some() || self.refresh().is_some()
    }

    /// True when the access token is missing or within the refresh margin.
    pub fn needs_refresh(&self, now_ms: i64) -> bool {
        match (self.access(), self.expiry_date) {
            (None, _) => true,
            (Some(_), Some(expiry)) => expiry - REFRESH_MARGIN_MS <= now_ms,
            (Some(_), None) => false,
        }
    }

    /// True when API calls can be authorized, either directly or after a refresh.
    pub fn is_usable(&self, now_ms: i64) -> bool {
        self.refresh().is_some() || (self.access().is_some() && !self.needs_refresh(now_ms))
    }

    /// Merges a refreshed bundle over this one.
    ///
    /// Google omits the refresh token on refresh responses, so the previous
    /// one is kept when the update has none.
    pub fn merged_with(&self, update: Credentials) -> Credentials {
        Credentials {
            access_token: update.access_token.or_else(|| self.access_token.clone()),
            refresh_token: update.refresh_token.or_else(|| self.refresh_token.clone()),
            scope: update.scope.or_else(|| self.scope.clone()),
            token_type: update.token_type.or_else(|| self.token_type.clone()),
            expiry_date: update.expiry_date,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("expiry_date", &self.expiry_date)
            .finish()
    }
}

/// Loads and saves [`Credentials`] through a [`DocumentStore`].
#[derive(Debug)]
pub struct TokenStore<S> {
    store: S,
}

impl<S: DocumentStore> TokenStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Where the token document lives.
    pub fn path(&self) -> PathBuf {
        self.store.location(TOKENS_FILE)
    }

    /// Loads the stored bundle. Returns `None` when no token file exists.
    pub fn load(&self) -> ApiResult<Option<Credentials>> {
        let credentials: Option<Credentials> = read_document(&self.store, TOKENS_FILE, None)?;
        if credentials.is_none() {
            debug!(path = %self.path().display(), "no stored tokens");
        }
        Ok(credentials)
    }

    /// Replaces the stored bundle.
    pub fn save(&self, credentials: &Credentials) -> ApiResult<()> {
        write_document(&self.store, TOKENS_FILE, credentials)?;
        info!(path = %self.path().display(), "saved tokens");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gcalwebhook_core::{FileStore, MemoryStore};

    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn bundle(access: Option<&str>, refresh: Option<&str>, expiry: Option<i64>) -> Credentials {
        Credentials {
            access_token: access.map(str::to_string),
            refresh_token: refresh.map(str::to_string),
            scope: Some("https://www.googleapis.com/auth/calendar".to_string()),
            token_type: Some("Bearer".to_string()),
            expiry_date: expiry,
        }
    }

    #[test]
    fn wire_shape_omits_absent_fields() {
        let creds = Credentials {
            access_token: Some("ya29.a".to_string()),
            expiry_date: Some(NOW),
            ..Credentials::default()
        };
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"access_token": "ya29.a", "expiry_date": 1_700_000_000_000_i64})
        );

        let parsed: Credentials = serde_json::from_str(
            r#"{"refresh_token":"1//r","scope":"s","token_type":"Bearer","expiry_date":5}"#,
        )
        .unwrap();
        assert_eq!(parsed.refresh(), Some("1//r"));
        assert_eq!(parsed.access(), None);
        assert_eq!(parsed.expiry_date, Some(5));
    }

    #[test]
    fn usability_rules() {
        assert!(!Credentials::default().is_usable(NOW));
        assert!(bundle(None, Some("r"), None).is_usable(NOW));
        assert!(bundle(Some("a"), None, None).is_usable(NOW));
        assert!(bundle(Some("a"), None, Some(NOW + 3_600_000)).is_usable(NOW));
        assert!(!bundle(Some("a"), None, Some(NOW + 30_000)).is_usable(NOW));
        assert!(!bundle(Some(""), Some(""), None).has_any_token());
    }

    #[test]
    fn refresh_margin() {
        assert!(bundle(None, Some("r"), None).needs_refresh(NOW));
        assert!(bundle(Some("a"), None, Some(NOW + REFRESH_MARGIN_MS)).needs_refresh(NOW));
        assert!(!bundle(Some("a"), None, Some(NOW + REFRESH_MARGIN_MS + 1)).needs_refresh(NOW));
        assert!(!bundle(Some("a"), None, None).needs_refresh(NOW));
    }

    #[test]
    fn merge_keeps_previous_refresh_token() {
        let previous = bundle(Some("old"), Some("refresh"), Some(NOW));
        let update = Credentials {
            access_token: Some("new".to_string()),
            expiry_date: Some(NOW + 3_600_000),
            ..Credentials::default()
        };
        let merged = previous.merged_with(update);
        assert_eq!(merged.access(), Some("new"));
        assert_eq!(merged.refresh(), Some("refresh"));
        assert_eq!(merged.expiry_date, Some(NOW + 3_600_000));
        assert_eq!(merged.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn debug_redacts_tokens() {
        let debug = format!("{:?}", bundle(Some("secret-a"), Some("secret-r"), None));
        assert!(!debug.contains("secret-a"));
        assert!(!debug.contains("secret-r"));
    }

    #[test]
    fn missing_file_loads_none() {
        let store = TokenStore::new(MemoryStore::new());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(FileStore::new(dir.path()));
        let creds = bundle(Some("a"), Some("r"), Some(NOW));

        store.save(&creds).unwrap();
        assert_eq!(store.path(), dir.path().join(TOKENS_FILE));
        assert_eq!(store.load().unwrap(), Some(creds));
    }

    #[test]
    fn corrupt_token_file_is_an_error() {
        let memory = MemoryStore::new();
        memory.insert(TOKENS_FILE, "{not json");
        let store = TokenStore::new(memory);
        assert!(store.load().is_err());
    }
}
