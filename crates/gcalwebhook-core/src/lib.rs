//! Core of the webhook channel manager: configuration paths, JSON document
//! storage, the channel model and the local channel registry.

pub mod channel;
pub mod format;
pub mod paths;
pub mod registry;
pub mod store;
pub mod tracing;

pub use channel::{
    ChannelStatus, NO_CALENDAR, ResourceType, StoredChannel, UnknownResourceType, now_ms,
    sort_by_expiration,
};
pub use format::{describe_expiration, format_timestamp, render_channel_table};
pub use paths::{CHANNELS_FILE, ConfigPaths, TOKENS_FILE};
pub use registry::ChannelRegistry;
pub use store::{
    DocumentStore, FileStore, MemoryStore, StoreError, StoreResult, read_document, write_document,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
