//! Terminal rendering of stored channels.

use chrono::SecondsFormat;

use crate::channel::{ChannelStatus, StoredChannel, from_epoch_ms};

const COLUMN_GAP: &str = "  ";
const HEADERS: [&str; 5] = ["CHANNEL ID", "CALENDAR", "RESOURCE", "EXPIRATION", "ADDRESS"];

/// Describes an expiration as `<ISO-8601> (<status>, <hours>h)`.
///
/// Returns `unknown` when the channel has no expiration.
pub fn describe_expiration(expiration: Option<i64>, now_ms: i64) -> String {
    let Some(ms) = expiration else {
        return "unknown".to_string();
    };

    let timestamp = from_epoch_ms(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string());
    let status = ChannelStatus::at(Some(ms), now_ms);
    let hours = ms.saturating_sub(now_ms) as f64 / 3_600_000.0;

    format!("{} ({}, {:.1}h)", timestamp, status, hours)
}

/// Formats an optional expiration as a bare ISO-8601 timestamp.
pub fn format_timestamp(expiration: Option<i64>) -> String {
    expiration
        .and_then(from_epoch_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Renders channels as an aligned text table, in the order given.
pub fn render_channel_table(channels: &[StoredChannel], now_ms: i64) -> String {
    let rows: Vec<[String; 5]> = channels
        .iter()
        .map(|channel| {
            [
                channel.channel_id.clone(),
                channel.calendar_id.clone(),
                channel.resource_type.to_string(),
                describe_expiration(channel.expiration, now_ms),
                channel.address.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header = HEADERS.map(str::to_string);
    std::iter::once(&header)
        .chain(rows.iter())
        .map(|row| render_row(row, &widths))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_row(row: &[String; 5], widths: &[usize; 5]) -> String {
    let last = row.len() - 1;
    row.iter()
        .enumerate()
        .map(|(i, cell)| {
            if i == last {
                cell.clone()
            } else {
                format!("{:<width$}", cell, width = widths[i])
            }
        })
        .collect::<Vec<_>>()
        .join(COLUMN_GAP)
}
