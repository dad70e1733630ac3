//! Test doubles shared by the command tests.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use gcalwebhook_core::{DocumentStore, MemoryStore, ResourceType, StoredChannel};
use gcalwebhook_google::{ApiError, ApiResult, BoxFuture, CalendarApi, WatchRequest, WatchedChannel};

/// A recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Watch {
        resource: ResourceType,
        calendar_id: Option<String>,
        request: WatchRequest,
    },
    Stop {
        channel_id: String,
        resource_id: String,
    },
}

/// In-memory [`CalendarApi`] recording every call.
#[derive(Debug, Default)]
pub struct FakeApi {
    pub calls: Mutex<Vec<Call>>,
    /// Channel ids whose stop call fails.
    pub failing_stops: HashSet<String>,
    /// Overrides the watch response; by default the request is echoed back.
    pub watch_response: Option<WatchedChannel>,
}

impl FakeApi {
    pub fn failing_stop(ids: &[&str]) -> Self {
        Self {
            failing_stops: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record_watch(
        &self,
        resource: ResourceType,
        calendar_id: Option<&str>,
        request: &WatchRequest,
    ) -> ApiResult<WatchedChannel> {
        self.calls.lock().unwrap().push(Call::Watch {
            resource,
            calendar_id: calendar_id.map(str::to_string),
            request: request.clone(),
        });
        Ok(self.watch_response.clone().unwrap_or_else(|| WatchedChannel {
            id: Some(request.id.clone()),
            resource_id: Some(format!("res-{}", resource)),
            resource_uri: Some(format!("https://www.googleapis.com/calendar/v3/{}", resource)),
            token: request.token.clone(),
            expiration: request.expiration,
        }))
    }
}

impl CalendarApi for FakeApi {
    fn watch_events<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(async move { self.record_watch(ResourceType::Events, Some(calendar_id), request) })
    }

    fn watch_acl<'a>(
        &'a self,
        calendar_id: &'a str,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(async move { self.record_watch(ResourceType::Acl, Some(calendar_id), request) })
    }

    fn watch_calendar_list<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(async move { self.record_watch(ResourceType::CalendarList, None, request) })
    }

    fn watch_settings<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, ApiResult<WatchedChannel>> {
        Box::pin(async move { self.record_watch(ResourceType::Settings, None, request) })
    }

    fn stop_channel<'a>(
        &'a self,
        channel_id: &'a str,
        resource_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call::Stop {
                channel_id: channel_id.to_string(),
                resource_id: resource_id.to_string(),
            });
            if self.failing_stops.contains(channel_id) {
                return Err(ApiError::not_found(format!("channel {} not found", channel_id)));
            }
            Ok(())
        })
    }
}

/// A store whose writes always fail.
pub struct ReadOnlyStore(pub MemoryStore);

impl DocumentStore for ReadOnlyStore {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        self.0.read(name)
    }

    fn write(&self, _name: &str, _contents: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }

    fn exists(&self, name: &str) -> bool {
        self.0.exists(name)
    }

    fn location(&self, name: &str) -> PathBuf {
        self.0.location(name)
    }
}

/// A stored events channel on `primary`.
pub fn channel(id: &str, expiration: Option<i64>) -> StoredChannel {
    StoredChannel {
        channel_id: id.to_string(),
        resource_id: format!("res-{id}"),
        resource_uri: "https://www.googleapis.com/calendar/v3/calendars/primary/events".to_string(),
        resource_type: ResourceType::Events,
        calendar_id: "primary".to_string(),
        address: "https://example.com/hook".to_string(),
        token: None,
        expiration,
        created_at: 0,
    }
}

/// Captured command output as a string.
pub fn output(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).unwrap()
}
