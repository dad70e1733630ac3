//! Channel records and their derived expiration status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder stored as `calendarId` for resources not scoped to a calendar.
pub const NO_CALENDAR: &str = "n/a";

/// Channels with less than this much time left are reported as expiring.
pub const EXPIRING_THRESHOLD_MS: i64 = 24 * 60 * 60 * 1000;

/// The calendar resource collection a channel watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    /// Events of one calendar.
    Events,
    /// Access control rules of one calendar.
    Acl,
    /// The user's calendar list.
    CalendarList,
    /// The user's settings.
    Settings,
}

impl ResourceType {
    /// Every supported resource type, in display order.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Events,
        ResourceType::Acl,
        ResourceType::CalendarList,
        ResourceType::Settings,
    ];

    /// The wire name of this resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Acl => "acl",
            Self::CalendarList => "calendarList",
            Self::Settings => "settings",
        }
    }

    /// Returns true if watching this resource needs a calendar id.
    pub fn requires_calendar(&self) -> bool {
        matches!(self, Self::Events | Self::Acl)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown resource type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported resource type '{input}'. Supported types: events, acl, calendarList, settings")]
pub struct UnknownResourceType {
    /// The rejected input.
    pub input: String,
}

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    /// Matches case-insensitively, so `calendarlist` and `CalendarList` both work.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownResourceType {
                input: s.to_string(),
            })
    }
}

/// A webhook channel persisted in the local registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChannel {
    /// Client-chosen channel identifier (UUID); primary key.
    pub channel_id: String,
    /// Remote identifier of the watched resource.
    pub resource_id: String,
    /// Canonical URI of the watched resource.
    pub resource_uri: String,
    /// Watched resource collection.
    pub resource_type: ResourceType,
    /// Calendar scope, or [`NO_CALENDAR`].
    pub calendar_id: String,
    /// HTTPS delivery endpoint.
    pub address: String,
    /// Verification token echoed in notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Expiry in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
    /// Local creation time in epoch milliseconds.
    pub created_at: i64,
}

impl StoredChannel {
    /// Returns true once the expiration has been reached.
    ///
    /// Channels without an expiration never count as expired.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiration.is_some_and(|expiration| now_ms >= expiration)
    }

    /// Derived status of the channel at `now_ms`.
    pub fn status(&self, now_ms: i64) -> ChannelStatus {
        ChannelStatus::at(self.expiration, now_ms)
    }

    /// Expiration as a UTC timestamp, if known and representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiration.and_then(from_epoch_ms)
    }
}

/// Status derived from a channel's expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// More than 24 hours left.
    Active,
    /// Less than 24 hours left.
    Expiring,
    /// Expiration reached.
    Expired,
    /// No expiration recorded.
    Unknown,
}

impl ChannelStatus {
    /// Classifies `expiration` relative to `now_ms`.
    pub fn at(expiration: Option<i64>, now_ms: i64) -> Self {
        match expiration {
            None => Self::Unknown,
            Some(expiration) => {
                let remaining = expiration.saturating_sub(now_ms);
                if remaining <= 0 {
                    Self::Expired
                } else if remaining < EXPIRING_THRESHOLD_MS {
                    Self::Expiring
                } else {
                    Self::Active
                }
            }
        }
    }

    /// Lowercase label used in output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorts channels by ascending expiration; channels without one go last.
///
/// The sort is stable, so ties keep their registry order.
pub fn sort_by_expiration(channels: &mut [StoredChannel]) {
    channels.sort_by_key(|channel| (channel.expiration.is_none(), channel.expiration));
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts epoch milliseconds to a UTC timestamp.
pub fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, expiration: Option<i64>) -> StoredChannel {
        StoredChannel {
            channel_id: id.to_string(),
            resource_id: format!("res-{id}"),
            resource_uri: format!("https://www.googleapis.com/calendar/v3/{id}"),
            resource_type: ResourceType::Events,
            calendar_id: "primary".to_string(),
            address: "https://example.com/hook".to_string(),
            token: None,
            expiration,
            created_at: 0,
        }
    }

    #[test]
    fn resource_type_parses_case_insensitively() {
        assert_eq!("events".parse::<ResourceType>().unwrap(), ResourceType::Events);
        assert_eq!("ACL".parse::<ResourceType>().unwrap(), ResourceType::Acl);
        assert_eq!(
            "calendarlist".parse::<ResourceType>().unwrap(),
            ResourceType::CalendarList
        );
        assert_eq!(
            "calendarList".parse::<ResourceType>().unwrap(),
            ResourceType::CalendarList
        );
        assert_eq!(
            "Settings".parse::<ResourceType>().unwrap(),
            ResourceType::Settings
        );
    }

    #[test]
    fn resource_type_rejects_unknown() {
        let err = "freebusy".parse::<ResourceType>().unwrap_err();
        assert!(err.to_string().contains("'freebusy'"));
        assert!(err.to_string().contains("calendarList"));
    }

    #[test]
    fn resource_type_serializes_as_camel_case() {
        let json = serde_json::to_string(&ResourceType::CalendarList).unwrap();
        assert_eq!(json, "\"calendarList\"");
    }

    #[test]
    fn only_calendar_scoped_resources_require_calendar() {
        assert!(ResourceType::Events.requires_calendar());
        assert!(ResourceType::Acl.requires_calendar());
        assert!(!ResourceType::CalendarList.requires_calendar());
        assert!(!ResourceType::Settings.requires_calendar());
    }

    #[test]
    fn stored_channel_uses_camel_case_keys() {
        let mut record = channel("abc", Some(42));
        record.token = Some("tok".to_string());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["channelId"], "abc");
        assert_eq!(value["resourceId"], "res-abc");
        assert_eq!(value["resourceType"], "events");
        assert_eq!(value["calendarId"], "primary");
        assert_eq!(value["expiration"], 42);
        assert_eq!(value["createdAt"], 0);
        assert_eq!(value["token"], "tok");
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let value = serde_json::to_value(channel("abc", None)).unwrap();
        assert!(value.get("expiration").is_none());
        assert!(value.get("token").is_none());
    }

    #[test]
    fn status_thresholds() {
        let now = 1_000_000_000;
        assert_eq!(ChannelStatus::at(None, now), ChannelStatus::Unknown);
        assert_eq!(ChannelStatus::at(Some(now), now), ChannelStatus::Expired);
        assert_eq!(ChannelStatus::at(Some(now - 1), now), ChannelStatus::Expired);
        assert_eq!(ChannelStatus::at(Some(now + 1), now), ChannelStatus::Expiring);
        assert_eq!(
            ChannelStatus::at(Some(now + EXPIRING_THRESHOLD_MS - 1), now),
            ChannelStatus::Expiring
        );
        assert_eq!(
            ChannelStatus::at(Some(now + EXPIRING_THRESHOLD_MS), now),
            ChannelStatus::Active
        );
    }

    #[test]
    fn expired_requires_an_expiration() {
        assert!(!channel("a", None).is_expired(i64::MAX));
        assert!(channel("a", Some(100)).is_expired(100));
        assert!(!channel("a", Some(100)).is_expired(99));
    }

    #[test]
    fn status_survives_extreme_values() {
        assert_eq!(ChannelStatus::at(Some(i64::MAX), i64::MIN), ChannelStatus::Active);
        assert_eq!(ChannelStatus::at(Some(i64::MIN), i64::MAX), ChannelStatus::Expired);
    }

    #[test]
    fn sort_puts_missing_expiration_last() {
        let mut channels = vec![
            channel("a", Some(200)),
            channel("b", Some(100)),
            channel("c", None),
        ];
        sort_by_expiration(&mut channels);

        let expirations: Vec<Option<i64>> = channels.iter().map(|c| c.expiration).collect();
        assert_eq!(expirations, vec![Some(100), Some(200), None]);
    }

    #[test]
    fn sort_is_stable_for_missing_expirations() {
        let mut channels = vec![channel("x", None), channel("y", Some(5)), channel("z", None)];
        sort_by_expiration(&mut channels);

        let ids: Vec<&str> = channels.iter().map(|c| c.channel_id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }
}
