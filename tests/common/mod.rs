// tests/common/mod.rs: in-memory message source shared by the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use quotebot::error::SourceError;
use quotebot::schema::{ChannelInfo, MessageRecord};
use quotebot::source::MessageSource;

pub const USER_U: u64 = 4242;
pub const OTHER_USER: u64 = 1111;

pub fn msg(id: u64, author_id: u64, reactions: u64) -> MessageRecord {
    MessageRecord {
        id,
        author_id,
        author_name: format!("user-{author_id}"),
        content: format!("message {id}"),
        timestamp: Utc.timestamp_opt(1_600_000_000 + id as i64, 0).unwrap(),
        reaction_count: reactions,
        attachment_url: None,
    }
}

pub fn msg_with_content(id: u64, author_id: u64, content: &str) -> MessageRecord {
    MessageRecord {
        content: content.to_string(),
        ..msg(id, author_id, 0)
    }
}

/// `count` messages by `author_id` with ids starting at `first_id`.
pub fn run_of(first_id: u64, count: u64, author_id: u64) -> Vec<MessageRecord> {
    (first_id..first_id + count).map(|id| msg(id, author_id, 0)).collect()
}

pub fn channel(id: u64) -> ChannelInfo {
    ChannelInfo {
        id,
        name: format!("channel-{id}"),
        readable: true,
    }
}

/// Pretends to be Discord: per-channel history, optional failures and delay,
/// and counters for every fetch.
#[derive(Default)]
pub struct FakeSource {
    channels: Vec<ChannelInfo>,
    history: Mutex<HashMap<u64, Vec<MessageRecord>>>,
    failing: Mutex<HashSet<u64>>,
    slow: Mutex<HashMap<u64, Duration>>,
    delay: Option<Duration>,
    before_calls: AtomicUsize,
    after_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(channels: Vec<ChannelInfo>) -> Self {
        Self {
            channels,
            ..Default::default()
        }
    }

    pub fn with_history(self, channel_id: u64, records: Vec<MessageRecord>) -> Self {
        self.append(channel_id, records);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// New messages showing up in a channel.
    pub fn append(&self, channel_id: u64, records: Vec<MessageRecord>) {
        let mut history = self.history.lock().unwrap();
        let messages = history.entry(channel_id).or_default();
        messages.extend(records);
        messages.sort_by_key(|r| r.id);
    }

    pub fn fail(&self, channel_id: u64) {
        self.failing.lock().unwrap().insert(channel_id);
    }

    pub fn recover(&self, channel_id: u64) {
        self.failing.lock().unwrap().remove(&channel_id);
    }

    /// Delays history fetches for one channel only.
    pub fn slow_down(&self, channel_id: u64, delay: Duration) {
        self.slow.lock().unwrap().insert(channel_id, delay);
    }

    pub fn before_calls(&self) -> usize {
        self.before_calls.load(Ordering::SeqCst)
    }

    pub fn after_calls(&self) -> usize {
        self.after_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.before_calls.store(0, Ordering::SeqCst);
        self.after_calls.store(0, Ordering::SeqCst);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn pause_channel(&self, channel_id: u64) {
        self.pause().await;
        let slow = self.slow.lock().unwrap().get(&channel_id).copied();
        if let Some(delay) = slow {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, channel_id: u64) -> Result<(), SourceError> {
        if self.failing.lock().unwrap().contains(&channel_id) {
            return Err(SourceError::Timeout(Duration::from_millis(1)));
        }
        Ok(())
    }

    fn messages(&self, channel_id: u64) -> Vec<MessageRecord> {
        self.history
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn list_channels(&self, _guild_id: u64) -> Result<Vec<ChannelInfo>, SourceError> {
        self.pause().await;
        Ok(self.channels.clone())
    }

    async fn fetch_messages_before(
        &self,
        channel_id: u64,
        limit: u8,
        before: Option<u64>,
    ) -> Result<Vec<MessageRecord>, SourceError> {
        self.before_calls.fetch_add(1, Ordering::SeqCst);
        self.pause_channel(channel_id).await;
        self.check(channel_id)?;

        let older: Vec<MessageRecord> = self
            .messages(channel_id)
            .into_iter()
            .filter(|r| before.map_or(true, |b| r.id < b))
            .collect();
        let skip = older.len().saturating_sub(limit as usize);
        Ok(older.into_iter().skip(skip).collect())
    }

    async fn fetch_messages_after(
        &self,
        channel_id: u64,
        limit: u8,
        after: u64,
    ) -> Result<Vec<MessageRecord>, SourceError> {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
        self.pause_channel(channel_id).await;
        self.check(channel_id)?;

        Ok(self
            .messages(channel_id)
            .into_iter()
            .filter(|r| r.id > after)
            .take(limit as usize)
            .collect())
    }
}
