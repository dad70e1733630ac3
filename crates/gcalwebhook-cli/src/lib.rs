//! The `gcalendar-webhook-cli` command-line interface.
//!
//! Creates, lists, stops and prunes Google Calendar push-notification
//! channels, keeping a local registry of what was created.

pub mod cli;
pub mod commands;
pub mod error;

#[cfg(test)]
mod test_support;

use std::io;

use gcalwebhook_core::{
    ChannelRegistry, ConfigPaths, FileStore, TracingConfig, TracingOutputFormat, init_tracing,
    now_ms,
};
use gcalwebhook_google::{
    ClientSettings, GoogleCalendarClient, LoginFlow, OAuthClient, Session, SystemBrowser,
    TokenStore,
};
use tracing::debug;

pub use cli::Cli;
pub use error::{CliError, CliResult};

use crate::cli::{ChannelsAction, Command, GoogleArgs, LogFormat};

/// Logging settings selected by `--debug` and `--log-format`.
pub fn tracing_config(cli: &Cli) -> TracingConfig {
    let config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    config.with_format(match cli.log_format {
        LogFormat::Compact => TracingOutputFormat::Compact,
        LogFormat::Json => TracingOutputFormat::Json,
    })
}

/// Installs the global subscriber for this invocation.
pub fn init_logging(cli: &Cli) -> CliResult<()> {
    init_tracing(tracing_config(cli))?;
    Ok(())
}

/// Validates the OAuth client configuration.
pub fn client_settings(google: &GoogleArgs) -> CliResult<ClientSettings> {
    Ok(ClientSettings::from_values(
        google.client_id.as_deref(),
        google.client_secret.as_deref(),
        google.redirect_port.as_deref(),
    )?)
}

/// Builds an authorized Calendar client from the stored tokens.
///
/// No network call happens here; the access token is refreshed on first use.
pub fn connect<'s>(
    google: &GoogleArgs,
    store: &'s FileStore,
) -> CliResult<GoogleCalendarClient<&'s FileStore>> {
    let settings = client_settings(google)?;
    let session = Session::load(&settings, TokenStore::new(store))?;
    Ok(GoogleCalendarClient::new(&settings, session)?)
}

/// Runs the parsed command against the default configuration directory.
pub async fn run(cli: Cli) -> CliResult<()> {
    let paths = ConfigPaths::from_env();
    debug!(config_dir = %paths.config_dir().display(), "resolved configuration directory");
    run_in(cli, &paths).await
}

/// Runs the parsed command against `paths`.
pub async fn run_in(cli: Cli, paths: &ConfigPaths) -> CliResult<()> {
    let store = FileStore::new(paths.config_dir());
    let registry = ChannelRegistry::new(&store);
    let google = &cli.google;
    let mut out = io::stdout();

    match cli.command {
        Command::Login => {
            let settings = client_settings(google)?;
            store
                .ensure_directory()
                .map_err(|source| CliError::ConfigDir {
                    path: store.dir().to_path_buf(),
                    source,
                })?;
            let mut flow = LoginFlow::new(OAuthClient::new(&settings)?, SystemBrowser);
            commands::login::run(
                &mut flow,
                settings.redirect_port,
                &TokenStore::new(&store),
                &mut out,
            )
            .await
        }
        Command::Watch(args) => {
            commands::watch::run(&registry, &args, || connect(google, &store), now_ms(), &mut out)
                .await
                .map(|_| ())
        }
        Command::Channels { action } => match action {
            ChannelsAction::List { json } => {
                commands::channels::list(&registry, json, now_ms(), &mut out)
            }
            ChannelsAction::Stop { channel_id } => {
                commands::channels::stop(&registry, &channel_id, || connect(google, &store), &mut out)
                    .await
            }
            ChannelsAction::Prune { dry_run } => commands::channels::prune(
                &registry,
                dry_run,
                || connect(google, &store),
                now_ms(),
                &mut out,
            )
            .await
            .map(|_| ()),
        },
        Command::Status => commands::status::run(&TokenStore::new(&store), now_ms(), &mut out),
        Command::Paths => commands::paths::run(paths, &mut out),
    }
}
