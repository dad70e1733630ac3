//! `login`: interactive OAuth authorization.

use std::io::Write;

use gcalwebhook_core::DocumentStore;
use gcalwebhook_google::{BrowserOpener, LoginFlow, TokenExchange, TokenStore};
use tracing::info;

use crate::error::CliResult;

/// Runs the loopback login on `port` and persists the tokens.
pub async fn run<S, E, B>(
    flow: &mut LoginFlow<E, B>,
    port: u16,
    tokens: &TokenStore<S>,
    out: &mut impl Write,
) -> CliResult<()>
where
    S: DocumentStore,
    E: TokenExchange,
    B: BrowserOpener,
{
    let server = flow.listen(port).await?;
    writeln!(
        out,
        "Waiting for Google to redirect to {}",
        server.redirect_uri()
    )?;
    out.flush()?;

    let credentials = flow.run(server, tokens).await?;
    info!(state = ?flow.state(), "login finished");

    writeln!(out, "Authorization successful.")?;
    writeln!(out, "Tokens saved to {}", tokens.path().display())?;
    if credentials.refresh().is_none() {
        writeln!(
            out,
            "Warning: Google returned no refresh token; you will need to log in again when the access token expires."
        )?;
    }
    Ok(())
}
