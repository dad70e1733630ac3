//! Error types for Google OAuth and Calendar API operations.

use std::fmt;

use gcalwebhook_core::StoreError;
use thiserror::Error;

/// The category of an API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    /// Credentials are missing, invalid or were rejected.
    AuthenticationFailed,
    /// The user lacks permission for the resource.
    AuthorizationFailed,
    /// Connection failed, timed out, etc.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// The server returned a 5xx status.
    ServerError,
    /// The response could not be understood.
    InvalidResponse,
    /// The resource or channel does not exist (404).
    NotFound,
    /// The request was rejected as invalid (400).
    BadRequest,
    /// Missing or invalid client configuration.
    ConfigurationError,
    /// Persisting or loading local state failed.
    StorageError,
    /// Unexpected internal state.
    InternalError,
}

impl ApiErrorCode {
    /// Stable snake_case name, shown before every error message.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while talking to Google or managing credentials.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    code: ApiErrorCode,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

macro_rules! constructors {
    ($($(#[$doc:meta])* $name:ident => $code:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $name(message: impl Into<String>) -> Self {
                Self::new(ApiErrorCode::$code, message)
            }
        )*
    };
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    constructors! {
        /// Missing, expired or rejected credentials.
        authentication => AuthenticationFailed,
        /// HTTP 403.
        authorization => AuthorizationFailed,
        network => NetworkError,
        /// HTTP 429.
        rate_limited => RateLimited,
        /// HTTP 5xx.
        server => ServerError,
        invalid_response => InvalidResponse,
        /// HTTP 404, e.g. stopping a channel Google no longer knows.
        not_found => NotFound,
        /// HTTP 400, or a request rejected before it was sent.
        bad_request => BadRequest,
        configuration => ConfigurationError,
        internal => InternalError,
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ApiErrorCode {
        self.code
    }

    /// The message without the code prefix.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::new(ApiErrorCode::StorageError, err.to_string()).with_source(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
