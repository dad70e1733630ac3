//! Local registry of webhook channels.
//!
//! The registry is a single JSON array document (`channels.json`). Every
//! mutation reads the whole collection, changes it in memory and writes it
//! back through the atomic document write. Collections are expected to hold
//! tens of records, so there are no partial updates and no indexes.
//!
//! Concurrent invocations are not coordinated: if two processes mutate the
//! registry at the same time, the later write replaces the earlier one.

use tracing::{debug, info};

use crate::channel::StoredChannel;
use crate::paths::CHANNELS_FILE;
use crate::store::{DocumentStore, StoreResult, read_document, write_document};

/// Channel registry backed by a [`DocumentStore`].
#[derive(Debug)]
pub struct ChannelRegistry<S> {
    store: S,
}

impl<S: DocumentStore> ChannelRegistry<S> {
    /// Creates a registry over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns every stored channel, in registry order.
    pub fn list(&self) -> StoreResult<Vec<StoredChannel>> {
        read_document(&self.store, CHANNELS_FILE, Vec::new())
    }

    /// Returns the channel with `channel_id`, if stored.
    pub fn get(&self, channel_id: &str) -> StoreResult<Option<StoredChannel>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|channel| channel.channel_id == channel_id))
    }

    /// Inserts `channel`, replacing any record with the same id.
    ///
    /// The new record is appended at the end of the collection.
    pub fn upsert(&self, channel: StoredChannel) -> StoreResult<()> {
        let mut channels = self.list()?;
        let before = channels.len();
        channels.retain(|existing| existing.channel_id != channel.channel_id);
        let replaced = channels.len() != before;

        info!(
            channel_id = %channel.channel_id,
            replaced,
            "storing channel"
        );
        channels.push(channel);
        self.save(&channels)
    }

    /// Removes the channel with `channel_id`. Absent ids are a no-op.
    pub fn remove(&self, channel_id: &str) -> StoreResult<()> {
        let mut channels = self.list()?;
        let before = channels.len();
        channels.retain(|channel| channel.channel_id != channel_id);

        if channels.len() == before {
            debug!(channel_id, "channel not in registry, nothing to remove");
        } else {
            info!(channel_id, "removed channel");
        }
        self.save(&channels)
    }

    fn save(&self, channels: &[StoredChannel]) -> StoreResult<()> {
        write_document(&self.store, CHANNELS_FILE, channels)
    }
}
