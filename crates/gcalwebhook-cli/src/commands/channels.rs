//! `channels list|stop|prune`.

use std::io::Write;

use gcalwebhook_core::{
    ChannelRegistry, DocumentStore, StoredChannel, format_timestamp, render_channel_table,
    sort_by_expiration,
};
use gcalwebhook_google::CalendarApi;
use tracing::{info, warn};

use crate::error::{CliError, CliResult};

/// Prints stored channels, soonest expiration first.
pub fn list<S: DocumentStore>(
    registry: &ChannelRegistry<S>,
    json: bool,
    now_ms: i64,
    out: &mut impl Write,
) -> CliResult<()> {
    let mut channels = registry.list()?;
    sort_by_expiration(&mut channels);

    if json {
        serde_json::to_writer_pretty(&mut *out, &channels)?;
        writeln!(out)?;
        return Ok(());
    }

    if channels.is_empty() {
        writeln!(out, "No stored channels.")?;
        return Ok(());
    }
    writeln!(out, "{}", render_channel_table(&channels, now_ms))?;
    Ok(())
}

/// Stops one channel remotely, then forgets it.
///
/// The record is kept when the remote call fails.
pub async fn stop<S, A, F>(
    registry: &ChannelRegistry<S>,
    channel_id: &str,
    connect: F,
    out: &mut impl Write,
) -> CliResult<()>
where
    S: DocumentStore,
    A: CalendarApi,
    F: FnOnce() -> CliResult<A>,
{
    let channel = registry
        .get(channel_id)?
        .ok_or_else(|| CliError::ChannelNotFound(channel_id.to_string()))?;

    let api = connect()?;
    api.stop_channel(&channel.channel_id, &channel.resource_id)
        .await?;
    registry.remove(&channel.channel_id)?;

    writeln!(out, "Stopped channel {}.", channel.channel_id)?;
    Ok(())
}

/// What a prune run did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Ids of the channels found expired.
    pub expired: Vec<String>,
    /// Ids stopped and removed.
    pub stopped: Vec<String>,
    /// Ids whose stop failed, with the reason. These stay in the registry.
    pub failed: Vec<(String, String)>,
}

/// Stops and removes every expired channel.
///
/// A failed stop, or a failed removal after a successful stop, is reported
/// and skipped. With `dry_run`, nothing is loaded
/// or called remotely.
pub async fn prune<S, A, F>(
    registry: &ChannelRegistry<S>,
    dry_run: bool,
    connect: F,
    now_ms: i64,
    out: &mut impl Write,
) -> CliResult<PruneReport>
where
    S: DocumentStore,
    A: CalendarApi,
    F: FnOnce() -> CliResult<A>,
{
    let expired: Vec<StoredChannel> = registry
        .list()?
        .into_iter()
        .filter(|channel| channel.is_expired(now_ms))
        .collect();
    let mut report = PruneReport {
        expired: expired.iter().map(|c| c.channel_id.clone()).collect(),
        ..PruneReport::default()
    };

    if expired.is_empty() {
        writeln!(out, "No expired channels.")?;
        return Ok(report);
    }

    writeln!(out, "Expired channels:")?;
    for channel in &expired {
        writeln!(
            out,
            "  {}  {}  expired {}",
            channel.channel_id,
            channel.resource_type,
            format_timestamp(channel.expiration)
        )?;
    }

    if dry_run {
        writeln!(out, "Dry run: nothing was stopped.")?;
        return Ok(report);
    }

    let api = connect()?;
    for channel in expired {
        let stopped = async {
            api.stop_channel(&channel.channel_id, &channel.resource_id)
                .await?;
            registry.remove(&channel.channel_id)?;
            Ok::<_, CliError>(())
        };
        match stopped.await {
            Ok(()) => {
                writeln!(out, "Stopped {}", channel.channel_id)?;
                report.stopped.push(channel.channel_id);
            }
            Err(err) => {
                warn!(channel_id = %channel.channel_id, error = %err, "failed to stop channel");
                writeln!(out, "Failed to stop {}: {}", channel.channel_id, err)?;
                report.failed.push((channel.channel_id, err.to_string()));
            }
        }
    }

    info!(
        stopped = report.stopped.len(),
        failed = report.failed.len(),
        "prune finished"
    );
    Ok(report)
}
