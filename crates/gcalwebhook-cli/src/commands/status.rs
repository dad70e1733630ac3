//! `status`: report on the stored credentials.
//!
//! Reads only the token file. Needs no OAuth client configuration and makes
//! no network calls.

use std::io::Write;

use gcalwebhook_core::{DocumentStore, format_timestamp};
use gcalwebhook_google::TokenStore;

use crate::error::CliResult;

const LOGIN_HINT: &str = "run `gcalendar-webhook-cli login`";

pub fn run<S: DocumentStore>(
    tokens: &TokenStore<S>,
    now_ms: i64,
    out: &mut impl Write,
) -> CliResult<()> {
    writeln!(out, "Token file:      {}", tokens.path().display())?;

    let Some(credentials) = tokens.load()?.filter(|c| c.has_any_token()) else {
        writeln!(out, "Credentials:     none ({})", LOGIN_HINT)?;
        return Ok(());
    };

    let usable = if credentials.is_usable(now_ms) {
        "usable".to_string()
    } else {
        format!("expired ({})", LOGIN_HINT)
    };
    let yes_no = |present: bool| if present { "yes" } else { "no" };

    writeln!(out, "Credentials:     {}", usable)?;
    writeln!(out, "Refresh token:   {}", yes_no(credentials.refresh().is_some()))?;
    writeln!(out, "Access token:    {}", yes_no(credentials.access().is_some()))?;
    writeln!(out, "Access expires:  {}", format_timestamp(credentials.expiry_date))?;
    if let Some(scope) = &credentials.scope {
        writeln!(out, "Scope:           {}", scope)?;
    }
    Ok(())
}
