use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::{
    error::{QuoteError, SourceError},
    metrics::{CACHED_CHANNELS, MESSAGES_BACKFILLED, MESSAGES_REFRESHED},
    ring::RingBuffer,
    schema::{ChannelInfo, MessageRecord},
    source::{MessageSource, PAGE_SIZE},
};

pub const DEFAULT_BACKFILL_PAGES: usize = 10;

/// Which cached messages a quote may be drawn from.
#[derive(Debug, Clone, Copy)]
pub struct MessageFilter<'a> {
    pub author_id: Option<u64>,
    pub command_prefix: &'a str,
}

impl<'a> MessageFilter<'a> {
    pub fn any() -> Self {
        Self {
            author_id: None,
            command_prefix: "",
        }
    }

    /// With an author set, bot commands and blank messages are skipped too.
    pub fn matches(&self, record: &MessageRecord) -> bool {
        let Some(author_id) = self.author_id else {
            return true;
        };
        record.author_id == author_id
            && !record.content.trim().is_empty()
            && (self.command_prefix.is_empty() || !record.content.starts_with(self.command_prefix))
    }
}

pub struct ChannelCacheEntry {
    pub info: ChannelInfo,
    ring: Mutex<RingBuffer<MessageRecord>>,
}

impl ChannelCacheEntry {
    fn new(info: ChannelInfo, capacity: usize) -> Self {
        Self {
            info,
            ring: Mutex::new(RingBuffer::with_capacity(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.ring.lock().await.len()
    }

    pub async fn oldest_id(&self) -> Option<u64> {
        self.ring.lock().await.first().map(|r| r.id)
    }

    pub async fn newest_id(&self) -> Option<u64> {
        self.ring.lock().await.last().map(|r| r.id)
    }

    /// Matching retained messages, oldest first.
    pub async fn snapshot(&self, filter: &MessageFilter<'_>) -> Vec<MessageRecord> {
        let ring = self.ring.lock().await;
        ring.iter().filter(|r| filter.matches(r)).cloned().collect()
    }

    /// `None` when the ring is locked by someone else.
    pub fn try_has_matching(&self, filter: &MessageFilter<'_>) -> Option<bool> {
        let ring = self.ring.try_lock().ok()?;
        let found = ring.iter().any(|r| filter.matches(r));
        Some(found)
    }

    /// Rebuilds the buffer from `history` followed by whatever cached messages
    /// are newer than it, so a late backfill never lands after live messages.
    async fn absorb_history(&self, history: Vec<MessageRecord>) -> usize {
        let mut ring = self.ring.lock().await;
        let newest = history.last().map(|r| r.id).unwrap_or(0);
        let newer: Vec<MessageRecord> = ring.iter().filter(|r| r.id > newest).cloned().collect();

        let mut rebuilt = RingBuffer::with_capacity(ring.capacity());
        rebuilt.push(history);
        rebuilt.push(newer);
        *ring = rebuilt;
        ring.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BackfillSummary {
    pub channels: usize,
    pub messages: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub channels: usize,
    pub messages: usize,
}

/// One message ring per channel, filled from a [`MessageSource`].
pub struct ChannelCacheRegistry {
    source: Arc<dyn MessageSource>,
    entries: RwLock<HashMap<u64, Arc<ChannelCacheEntry>>>,
    unreachable: RwLock<HashSet<u64>>,
    capacity: usize,
    fetch_timeout: Duration,
    backfill_pages: usize,
}

impl ChannelCacheRegistry {
    pub fn new(source: Arc<dyn MessageSource>, fetch_timeout: Duration) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
            unreachable: RwLock::new(HashSet::new()),
            capacity: RingBuffer::<MessageRecord>::DEFAULT_CAPACITY,
            fetch_timeout,
            backfill_pages: DEFAULT_BACKFILL_PAGES,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_backfill_pages(mut self, pages: usize) -> Self {
        self.backfill_pages = pages;
        self
    }

    /// Guild channels as the source lists them, except that channels whose
    /// last backfill failed are reported unreadable.
    pub async fn list_channels(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, QuoteError> {
        let mut channels = self.fetch_channel_list(guild_id).await?;
        let unreachable = self.unreachable.read().await;
        for channel in channels.iter_mut() {
            if unreachable.contains(&channel.id) {
                channel.readable = false;
            }
        }
        Ok(channels)
    }

    async fn fetch_channel_list(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, QuoteError> {
        self.bounded(guild_id, "list_channels", self.source.list_channels(guild_id))
            .await
    }

    /// Sweeps every readable channel of the guild, one after another. A channel
    /// that fails is logged, skipped, and left out of quote selection until a
    /// later backfill reaches it.
    pub async fn backfill(&self, guild_id: u64) -> Result<BackfillSummary, QuoteError> {
        let channels = self.fetch_channel_list(guild_id).await?;
        let mut summary = BackfillSummary::default();

        for channel in channels.into_iter().filter(|c| c.readable) {
            let channel_id = channel.id;
            match self.backfill_channel(channel).await {
                Ok(count) => {
                    self.unreachable.write().await.remove(&channel_id);
                    summary.channels += 1;
                    summary.messages += count;
                }
                Err(err) => {
                    warn!(channel_id, error = %err, "Skipping channel in backfill");
                    self.unreachable.write().await.insert(channel_id);
                    summary.failed += 1;
                }
            }
        }

        info!(
            guild_id,
            channels = summary.channels,
            messages = summary.messages,
            failed = summary.failed,
            "Backfill complete"
        );
        Ok(summary)
    }

    /// Pages backward through the channel's history and caches it oldest first.
    pub async fn backfill_channel(&self, info: ChannelInfo) -> Result<usize, QuoteError> {
        let channel_id = info.id;
        let mut pages: Vec<Vec<MessageRecord>> = Vec::new();
        let mut before = None;

        for _ in 0..self.backfill_pages {
            let page = self
                .bounded(
                    channel_id,
                    "backfill",
                    self.source.fetch_messages_before(channel_id, PAGE_SIZE, before),
                )
                .await?;
            let exhausted = page.len() < PAGE_SIZE as usize;
            before = page.first().map(|r| r.id);
            if !page.is_empty() {
                pages.push(page);
            }
            if exhausted || before.is_none() {
                break;
            }
        }

        let history: Vec<MessageRecord> = pages.into_iter().rev().flatten().collect();
        let fetched = history.len();
        let entry = self.entry_or_insert(info).await;
        let cached = entry.absorb_history(history).await;

        MESSAGES_BACKFILLED.inc_by(fetched as f64);
        debug!(channel_id, fetched, cached, "Backfilled channel");
        Ok(cached)
    }

    pub async fn get(&self, channel_id: u64) -> Option<Arc<ChannelCacheEntry>> {
        self.entries.read().await.get(&channel_id).cloned()
    }

    /// Extends the channel's cache with messages newer than its newest one.
    /// The ring is only locked to read the cursor and to push; the fetch runs
    /// unlocked, and anything at or below the newest id at push time is dropped.
    pub async fn refresh(&self, channel_id: u64) -> Result<Arc<ChannelCacheEntry>, QuoteError> {
        let entry = self
            .get(channel_id)
            .await
            .ok_or(QuoteError::CacheMiss(channel_id))?;

        let fetched = match entry.newest_id().await {
            Some(after) => {
                self.bounded(
                    channel_id,
                    "refresh",
                    self.source.fetch_messages_after(channel_id, PAGE_SIZE, after),
                )
                .await?
            }
            None => {
                self.bounded(
                    channel_id,
                    "refresh",
                    self.source.fetch_messages_before(channel_id, PAGE_SIZE, None),
                )
                .await?
            }
        };

        let mut ring = entry.ring.lock().await;
        let newest = ring.last().map(|r| r.id);
        let fresh: Vec<MessageRecord> = fetched
            .into_iter()
            .filter(|r| newest.map_or(true, |n| r.id > n))
            .collect();
        if !fresh.is_empty() {
            MESSAGES_REFRESHED.inc_by(fresh.len() as f64);
            debug!(channel_id, added = fresh.len(), "Refreshed channel cache");
            ring.push(fresh);
        }
        drop(ring);

        Ok(entry)
    }

    /// Single-page live fetch for a channel that has no cache yet. The result
    /// becomes the channel's cache.
    pub async fn load_live(&self, info: ChannelInfo) -> Result<Arc<ChannelCacheEntry>, QuoteError> {
        let channel_id = info.id;
        let page = self
            .bounded(
                channel_id,
                "live_fetch",
                self.source.fetch_messages_before(channel_id, PAGE_SIZE, None),
            )
            .await?;

        let entry = self.entry_or_insert(info).await;
        entry.absorb_history(page).await;
        Ok(entry)
    }

    pub async fn stats(&self) -> CacheStats {
        let entries: Vec<Arc<ChannelCacheEntry>> =
            self.entries.read().await.values().cloned().collect();

        let mut stats = CacheStats {
            channels: entries.len(),
            messages: 0,
        };
        for entry in entries {
            stats.messages += entry.len().await;
        }
        stats
    }

    async fn entry_or_insert(&self, info: ChannelInfo) -> Arc<ChannelCacheEntry> {
        let mut entries = self.entries.write().await;
        let capacity = self.capacity;
        let entry = entries
            .entry(info.id)
            .or_insert_with(|| Arc::new(ChannelCacheEntry::new(info, capacity)))
            .clone();
        CACHED_CHANNELS.set(entries.len() as f64);
        entry
    }

    async fn bounded<T>(
        &self,
        target_id: u64,
        operation: &'static str,
        fetch: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, QuoteError> {
        let source = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => SourceError::Timeout(self.fetch_timeout),
        };

        error!(target_id, operation, error = %source, "Discord fetch failed");
        Err(QuoteError::Network {
            target_id,
            operation,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(author_id: u64, content: &str) -> MessageRecord {
        MessageRecord {
            id: 1,
            author_id,
            author_name: "someone".to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            reaction_count: 0,
            attachment_url: None,
        }
    }

    #[test]
    fn unfiltered_matches_everything() {
        let filter = MessageFilter::any();
        assert!(filter.matches(&record(1, "")));
        assert!(filter.matches(&record(2, "!quote")));
    }

    #[test]
    fn author_filter_skips_commands_and_blanks() {
        let filter = MessageFilter {
            author_id: Some(1),
            command_prefix: "!",
        };
        assert!(filter.matches(&record(1, "hello there")));
        assert!(!filter.matches(&record(2, "hello there")));
        assert!(!filter.matches(&record(1, "!quote @someone")));
        assert!(!filter.matches(&record(1, "   ")));
    }

    #[test]
    fn empty_prefix_does_not_exclude_everything() {
        let filter = MessageFilter {
            author_id: Some(1),
            command_prefix: "",
        };
        assert!(filter.matches(&record(1, "hi")));
    }
}
