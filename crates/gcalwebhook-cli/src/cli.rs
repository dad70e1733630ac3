//! Command-line interface definition.

use clap::{Args, Parser, Subcommand, ValueEnum};
use gcalwebhook_core::ResourceType;

/// Manage Google Calendar push-notification webhook channels.
#[derive(Debug, Parser)]
#[command(name = "gcalendar-webhook-cli")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Diagnostic log format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub google: GoogleArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// OAuth client configuration, usually taken from the environment.
#[derive(Debug, Clone, Default, Args)]
pub struct GoogleArgs {
    /// OAuth client ID
    #[arg(long, env = "GOOGLE_CLIENT_ID", global = true, hide_env_values = true)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Loopback port for the login redirect (1024-65535, default 53682)
    #[arg(long, env = "GOOGLE_REDIRECT_PORT", global = true)]
    pub redirect_port: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize access to Google Calendar and store the tokens
    Login,

    /// Create a webhook channel
    Watch(WatchArgs),

    /// Manage stored channels
    Channels {
        #[command(subcommand)]
        action: ChannelsAction,
    },

    /// Show the state of the stored credentials
    Status,

    /// Show where configuration files are kept
    Paths,
}

/// Arguments for `watch`.
#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// HTTPS endpoint that receives notifications
    #[arg(long)]
    pub address: String,

    /// Calendar to watch (events and acl only)
    #[arg(long, default_value = "primary")]
    pub calendar_id: String,

    /// Verification token echoed in every notification (max 256 characters)
    #[arg(long)]
    pub token: Option<String>,

    /// Requested channel lifetime in hours
    #[arg(long, allow_negative_numbers = true)]
    pub ttl_hours: Option<f64>,

    /// Resource to watch: events, acl, calendarList or settings
    #[arg(long, default_value_t = ResourceType::Events.as_str().to_string())]
    pub resource: String,
}

/// Channel subcommands.
#[derive(Debug, Subcommand)]
pub enum ChannelsAction {
    /// List stored channels, soonest expiration first
    List {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop a channel and forget it
    Stop {
        /// Channel ID to stop
        channel_id: String,
    },

    /// Stop and forget every expired channel
    Prune {
        /// Only report what would be pruned
        #[arg(long)]
        dry_run: bool,
    },
}
