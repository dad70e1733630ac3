//! Google Calendar API client for push-notification channels.
//!
//! Covers the four watchable collections (events, ACL, calendar list,
//! settings) and `channels.stop`. Everything else in the Calendar API is out
//! of scope.

use std::future::Future;
use std::pin::Pin;

use gcalwebhook_core::{DocumentStore, ResourceType};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ClientSettings;
use crate::error::{ApiError, ApiResult};
use crate::session::Session;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Channel type for HTTPS webhook delivery.
pub const WEB_HOOK: &str = "web_hook";

/// Body of a `watch` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchRequest {
    /// Caller-chosen channel id.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// HTTPS endpoint receiving notifications.
    pub address: String,
    /// Opaque string echoed back in every notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Requested expiration, epoch milliseconds. Sent as a decimal string.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "epoch_ms::serialize"
    )]
    pub expiration: Option<i64>,
}

impl WatchRequest {
    /// A webhook channel request delivering to `address`.
    pub fn web_hook(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: WEB_HOOK.to_string(),
            address: address.into(),
            token: None,
            expiration: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_expiration(mut self, expiration: Option<i64>) -> Self {
        self.expiration = expiration;
        self
    }
}

/// Channel resource returned by a `watch` call. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedChannel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_uri: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Epoch milliseconds. Google sends a decimal string.
    #[serde(default, deserialize_with = "epoch_ms::deserialize")]
    pub expiration: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest<'a> {
    id: &'a str,
    resource_id: &'a str,
}

/// The Calendar API operations the CLI needs.
pub trait CalendarApi: Send + Sync {
    /// `events.watch` on one calendar.
    fn watch_events<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>>;

    /// `acl.watch` on one calendar.
    fn watch_acl<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>>;

    /// `calendarList.watch` for the authenticated user.
    fn watch_calendar_list<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>>;

    /// `settings.watch` for the authenticated user.
    fn watch_settings<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>>;

    /// `channels.stop`.
    fn stop_channel<'a>(
        &'a self,
        channel_id: &'a str,
        resource_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>>;

    /// Dispatches to the watch call for `resource`.
    ///
    /// `calendar_id` is ignored for user-level resources and required for
    /// calendar-scoped ones.
    fn watch<'a>(
        &'a self,
        resource: ResourceType,
        calendar_id: Option<&'a str>,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        match (resource, calendar_id) {
            (ResourceType::Events, Some(calendar_id)) => self.watch_events(calendar_id, request),
            (ResourceType::Acl, Some(calendar_id)) => self.watch_acl(calendar_id, request),
            (ResourceType::CalendarList, _) => self.watch_calendar_list(request),
            (ResourceType::Settings, _) => self.watch_settings(request),
            (resource, None) => Box::pin(async move {
                Err(ApiError::bad_request(format!(
                    "a calendar id is required to watch {}",
                    resource
                )))
            }),
        }
    }
}

impl<T: CalendarApi + ?Sized> CalendarApi for &T {
    fn watch_events<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        (**self).watch_events(calendar_id, request)
    }

    fn watch_acl<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        (**self).watch_acl(calendar_id, request)
    }

    fn watch_calendar_list<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        (**self).watch_calendar_list(request)
    }

    fn watch_settings<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        (**self).watch_settings(request)
    }

    fn stop_channel<'a>(
        &'a self,
        channel_id: &'a str,
        resource_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        (**self).stop_channel(channel_id, resource_id)
    }
}

/// reqwest-backed [`CalendarApi`] authorized by a [`Session`].
#[derive(Debug)]
pub struct GoogleCalendarClient<S> {
    http_client: reqwest::Client,
    api_base: String,
    session: Session<S>,
}

impl<S: DocumentStore> GoogleCalendarClient<S> {
    pub fn new(settings: &ClientSettings, session: Session<S>) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                ApiError::internal(format!("failed to create HTTP client: {}", e)).with_source(e)
            })?;

        Ok(Self {
            http_client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            session,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> ApiResult<String> {
        let url = format!("{}{}", self.api_base, path);
        let access_token = self.session.access_token().await?;
        debug!(%url, "POST");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::network(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(error_for_status(status, &text));
        }
        Ok(text)
    }

    async fn post_watch(&self, path: String, request: &WatchRequest) -> ApiResult<WatchedChannel> {
        let body = self.post(&path, request).await?;
        let channel: WatchedChannel = serde_json::from_str(&body).map_err(|e| {
            ApiError::invalid_response(format!("invalid channel response: {}", e))
        })?;
        info!(
            channel_id = %request.id,
            resource_id = channel.resource_id.as_deref().unwrap_or("-"),
            "watch channel created"
        );
        Ok(channel)
    }

    async fn stop(&self, channel_id: &str, resource_id: &str) -> ApiResult<()> {
        self.post(
            "/channels/stop",
            &StopRequest {
                id: channel_id,
                resource_id,
            },
        )
        .await?;
        info!(channel_id, "channel stopped");
        Ok(())
    }
}

fn calendar_path(calendar_id: &str, collection: &str) -> String {
    format!(
        "/calendars/{}/{}/watch",
        urlencoding::encode(calendar_id),
        collection
    )
}

impl<S: DocumentStore> CalendarApi for GoogleCalendarClient<S> {
    fn watch_events<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(self.post_watch(calendar_path(calendar_id, "events"), request))
    }

    fn watch_acl<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(self.post_watch(calendar_path(calendar_id, "acl"), request))
    }

    fn watch_calendar_list<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(self.post_watch("/users/me/calendarList/watch".to_string(), request))
    }

    fn watch_settings<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(self.post_watch("/users/me/settings/watch".to_string(), request))
    }

    fn stop_channel<'a>(
        &'a self,
        channel_id: &'a str,
        resource_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(self.stop(channel_id, resource_id))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn error_for_status(status: StatusCode, body: &str) -> ApiError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.trim().to_string());
    let message = format!("Google Calendar API returned {}: {}", status, detail);

    match status {
        StatusCode::UNAUTHORIZED => ApiError::authentication(message),
        StatusCode::FORBIDDEN => ApiError::authorization(message),
        StatusCode::NOT_FOUND => ApiError::not_found(message),
        StatusCode::TOO_MANY_REQUESTS => ApiError::rate_limited(message),
        StatusCode::BAD_REQUEST => ApiError::bad_request(message),
        s if s.is_server_error() => ApiError::server(message),
        _ => ApiError::invalid_response(message),
    }
}

mod epoch_ms {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ms) => serializer.serialize_str(&ms.to_string()),
            None => serializer.serialize_none(),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    /// Accepts a decimal string or a number. Unparsable strings become `None`.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => None,
            Some(Raw::Number(ms)) => Some(ms),
            Some(Raw::Text(text)) => text.trim().parse().ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gcalwebhook_core::{MemoryStore, TOKENS_FILE};
    use mockito::{Matcher, ServerGuard};
    use serde_json::json;

    use super::*;
    use crate::config::OAuthCredentials;
    use crate::error::ApiErrorCode;
    use crate::tokens::TokenStore;

    fn client(server: &ServerGuard) -> GoogleCalendarClient<MemoryStore> {
        let settings = ClientSettings::new(OAuthCredentials::new("id", "secret"), 53682)
            .with_api_base(server.url())
            .with_token_url(format!("{}/token", server.url()));
        let memory = MemoryStore::new();
        memory.insert(
            TOKENS_FILE,
            format!(
                r#"{{"access_token":"ya29.test","refresh_token":"r","expiry_date":{}}}"#,
                Utc::now().timestamp_millis() + 3_600_000
            ),
        );
        let session = Session::load(&settings, TokenStore::new(memory)).unwrap();
        GoogleCalendarClient::new(&settings, session).unwrap()
    }

    fn request() -> WatchRequest {
        WatchRequest::web_hook("chan-1", "https://example.com/hook")
            .with_token(Some("tok".to_string()))
            .with_expiration(Some(1_700_000_000_000))
    }

    #[test]
    fn request_wire_shape() {
        let body = serde_json::to_value(request()).unwrap();
        assert_eq!(
            body,
            json!({
                "id": "chan-1",
                "type": "web_hook",
                "address": "https://example.com/hook",
                "token": "tok",
                "expiration": "1700000000000"
            })
        );

        let bare = serde_json::to_value(WatchRequest::web_hook("x", "https://h")).unwrap();
        assert_eq!(bare, json!({"id": "x", "type": "web_hook", "address": "https://h"}));
    }

    #[test]
    fn channel_response_parsing() {
        let channel: WatchedChannel = serde_json::from_value(json!({
            "kind": "api#channel",
            "id": "chan-1",
            "resourceId": "res",
            "resourceUri": "https://www.googleapis.com/calendar/v3/calendars/primary/events",
            "expiration": "1700000000000"
        }))
        .unwrap();
        assert_eq!(channel.resource_id.as_deref(), Some("res"));
        assert_eq!(channel.expiration, Some(1_700_000_000_000));
        assert_eq!(channel.token, None);

        let numeric: WatchedChannel = serde_json::from_value(json!({"expiration": 5})).unwrap();
        assert_eq!(numeric.expiration, Some(5));
        let garbage: WatchedChannel =
            serde_json::from_value(json!({"expiration": "soon"})).unwrap();
        assert_eq!(garbage.expiration, None);
        assert_eq!(
            serde_json::from_value::<WatchedChannel>(json!({})).unwrap(),
            WatchedChannel::default()
        );
    }

    #[tokio::test]
    async fn watch_events_posts_to_calendar() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                Matcher::Regex(r"^/calendars/team(%40|@)group\.calendar\.google\.com/events/watch$".into()),
            )
            .match_header("authorization", "Bearer ya29.test")
            .match_body(Matcher::Json(serde_json::to_value(request()).unwrap()))
            .with_status(200)
            .with_body(
                r#"{"kind":"api#channel","id":"chan-1","resourceId":"res-9",
                    "resourceUri":"https://www.googleapis.com/calendar/v3/calendars/team/events",
                    "token":"tok","expiration":"1700000000000"}"#,
            )
            .create_async()
            .await;

        let api = client(&server);
        let channel = api
            .watch(
                ResourceType::Events,
                Some("team@group.calendar.google.com"),
                &request(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(channel.resource_id.as_deref(), Some("res-9"));
        assert_eq!(channel.expiration, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn user_level_resources_ignore_calendar() {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("POST", "/users/me/calendarList/watch")
            .with_status(200)
            .with_body(r#"{"resourceId":"cl"}"#)
            .create_async()
            .await;
        let settings = server
            .mock("POST", "/users/me/settings/watch")
            .with_status(200)
            .with_body(r#"{"resourceId":"st"}"#)
            .create_async()
            .await;

        let api = client(&server);
        let a = api
            .watch(ResourceType::CalendarList, Some("ignored"), &request())
            .await
            .unwrap();
        let b = api.watch(ResourceType::Settings, None, &request()).await.unwrap();

        list.assert_async().await;
        settings.assert_async().await;
        assert_eq!(a.resource_id.as_deref(), Some("cl"));
        assert_eq!(b.resource_id.as_deref(), Some("st"));
    }

    #[tokio::test]
    async fn acl_watch_requires_calendar() {
        let server = mockito::Server::new_async().await;
        let err = client(&server)
            .watch(ResourceType::Acl, None, &request())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::BadRequest);
        assert!(err.message().contains("acl"));
    }

    #[tokio::test]
    async fn stop_channel_sends_id_and_resource() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/stop")
            .match_body(Matcher::Json(json!({"id": "chan-1", "resourceId": "res-9"})))
            .with_status(204)
            .create_async()
            .await;

        client(&server).stop_channel("chan-1", "res-9").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_errors_map_to_codes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/channels/stop")
            .with_status(404)
            .with_body(r#"{"error":{"code":404,"message":"Channel 'chan-1' not found for project"}}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/users/me/settings/watch")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;
        server
            .mock("POST", "/users/me/calendarList/watch")
            .with_status(503)
            .create_async()
            .await;

        let api = client(&server);
        let not_found = api.stop_channel("chan-1", "res").await.unwrap_err();
        assert_eq!(not_found.code(), ApiErrorCode::NotFound);
        assert!(not_found.message().contains("Channel 'chan-1' not found"));

        let unauthorized = api.watch_settings(&request()).await.unwrap_err();
        assert_eq!(unauthorized.code(), ApiErrorCode::AuthenticationFailed);

        let unavailable = api.watch_calendar_list(&request()).await.unwrap_err();
        assert_eq!(unavailable.code(), ApiErrorCode::ServerError);
    }

    #[tokio::test]
    async fn malformed_watch_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/users/me/settings/watch")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = client(&server).watch_settings(&request()).await.unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::InvalidResponse);
    }
}
