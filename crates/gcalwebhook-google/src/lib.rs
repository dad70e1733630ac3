//! Google OAuth and Calendar API plumbing for webhook channels.
//!
//! - [`ClientSettings`] - OAuth client identity and endpoints
//! - [`LoginFlow`] - interactive loopback login persisting [`Credentials`]
//! - [`Session`] - stored credentials with lazy token refresh
//! - [`CalendarApi`] - the watch/stop operations, implemented by
//!   [`GoogleCalendarClient`]
//!
//! ```ignore
//! use gcalwebhook_google::{ClientSettings, GoogleCalendarClient, Session, TokenStore};
//!
//! let settings = ClientSettings::from_env()?;
//! let session = Session::load(&settings, TokenStore::new(store))?;
//! let api = GoogleCalendarClient::new(&settings, session)?;
//! api.stop_channel("channel-id", "resource-id").await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod login;
pub mod oauth;
pub mod session;
pub mod tokens;

pub use client::{BoxFuture, CalendarApi, GoogleCalendarClient, WEB_HOOK, WatchRequest, WatchedChannel};
pub use config::{
    CALENDAR_SCOPE, CLIENT_ID_VAR, CLIENT_SECRET_VAR, ClientSettings, DEFAULT_REDIRECT_PORT,
    OAuthCredentials, REDIRECT_PORT_VAR,
};
pub use error::{ApiError, ApiErrorCode, ApiResult};
pub use login::{BrowserOpener, CallbackParams, CallbackRequest, FlowState, LoginFlow, LoopbackServer, SystemBrowser};
pub use oauth::{OAuthClient, PkceFlow, TokenExchange};
pub use session::{NO_CREDENTIALS_MESSAGE, Session};
pub use tokens::{Credentials, REFRESH_MARGIN_MS, TokenStore};
