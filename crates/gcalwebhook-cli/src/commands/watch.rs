//! `watch`: create a webhook channel and record it.

use std::io::Write;

use chrono::SecondsFormat;
use gcalwebhook_core::{ChannelRegistry, DocumentStore, NO_CALENDAR, ResourceType, StoredChannel};
use gcalwebhook_google::{ApiError, CalendarApi, WatchRequest};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::cli::WatchArgs;
use crate::error::{CliError, CliResult};

/// Google rejects longer channel tokens.
pub const MAX_TOKEN_LEN: usize = 256;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// A validated watch request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchPlan {
    pub address: String,
    pub resource: ResourceType,
    /// Set only for calendar-scoped resources.
    pub calendar_id: Option<String>,
    pub token: Option<String>,
    pub expiration: Option<i64>,
}

/// Checks the arguments without touching credentials or the network.
pub fn validate(args: &WatchArgs, now_ms: i64) -> CliResult<WatchPlan> {
    let url = Url::parse(&args.address)
        .map_err(|e| CliError::validation(format!("Invalid address '{}': {}", args.address, e)))?;
    if url.scheme() != "https" {
        return Err(CliError::validation(format!(
            "Address must use https (got '{}')",
            args.address
        )));
    }

    let resource: ResourceType = args
        .resource
        .parse()
        .map_err(|e: gcalwebhook_core::UnknownResourceType| CliError::validation(e.to_string()))?;

    let calendar_id = if resource.requires_calendar() {
        let id = args.calendar_id.trim();
        if id.is_empty() {
            return Err(CliError::validation(format!(
                "A calendar id is required for resource type {}",
                resource
            )));
        }
        Some(id.to_string())
    } else {
        None
    };

    if let Some(token) = &args.token {
        if token.chars().count() > MAX_TOKEN_LEN {
            return Err(CliError::validation(format!(
                "Token must be at most {} characters",
                MAX_TOKEN_LEN
            )));
        }
    }

    let expiration = match args.ttl_hours {
        None => None,
        Some(hours) if hours.is_finite() && hours > 0.0 => {
            Some(expiration_after(now_ms, hours).ok_or_else(|| {
                CliError::validation(format!("TTL hours is too large (got {})", hours))
            })?)
        }
        Some(hours) => {
            return Err(CliError::validation(format!(
                "TTL hours must be a positive number (got {})",
                hours
            )));
        }
    };

    Ok(WatchPlan {
        address: args.address.clone(),
        resource,
        calendar_id,
        token: args.token.clone(),
        expiration,
    })
}

/// `now_ms` plus `hours`, floored to whole milliseconds. `None` on overflow.
fn expiration_after(now_ms: i64, hours: f64) -> Option<i64> {
    let ttl_ms = (hours * MS_PER_HOUR).floor();
    if ttl_ms >= i64::MAX as f64 {
        return None;
    }
    now_ms.checked_add(ttl_ms as i64)
}

/// Validates, creates the channel remotely, then records it.
///
/// `connect` is only called once validation has passed.
pub async fn run<S, A, F>(
    registry: &ChannelRegistry<S>,
    args: &WatchArgs,
    connect: F,
    now_ms: i64,
    out: &mut impl Write,
) -> CliResult<StoredChannel>
where
    S: DocumentStore,
    A: CalendarApi,
    F: FnOnce() -> CliResult<A>,
{
    let plan = validate(args, now_ms)?;
    let api = connect()?;

    let request = WatchRequest::web_hook(Uuid::new_v4().to_string(), &plan.address)
        .with_token(plan.token.clone())
        .with_expiration(plan.expiration);
    debug!(channel_id = %request.id, resource = %plan.resource, "creating channel");

    let response = api
        .watch(plan.resource, plan.calendar_id.as_deref(), &request)
        .await?;

    let (Some(channel_id), Some(resource_id), Some(resource_uri)) =
        (response.id, response.resource_id, response.resource_uri)
    else {
        return Err(ApiError::invalid_response(
            "Watch response is missing the channel id, resourceId or resourceUri",
        )
        .into());
    };

    let channel = StoredChannel {
        channel_id,
        resource_id,
        resource_uri,
        resource_type: plan.resource,
        calendar_id: plan
            .calendar_id
            .unwrap_or_else(|| NO_CALENDAR.to_string()),
        address: plan.address,
        token: response.token.or(plan.token),
        expiration: response.expiration.or(plan.expiration),
        created_at: now_ms,
    };
    registry.upsert(channel.clone())?;

    let expiration = channel
        .expires_at()
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "not provided".to_string());
    writeln!(out, "Channel created.")?;
    writeln!(out, "  Channel ID:   {}", channel.channel_id)?;
    writeln!(out, "  Resource ID:  {}", channel.resource_id)?;
    writeln!(out, "  Resource URI: {}", channel.resource_uri)?;
    writeln!(out, "  Expiration:   {}", expiration)?;

    Ok(channel)
}
