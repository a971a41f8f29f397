use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    Attachment, Cache, ChannelId, ChannelType, GetMessages, GuildId, Http, Message, MessageId,
    Permissions,
};
use tracing::debug;

use crate::{
    error::SourceError,
    metrics::DISCORD_API_DURATION,
    schema::{ChannelInfo, MessageRecord},
};

/// Largest page Discord hands out per history request.
pub const PAGE_SIZE: u8 = 100;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Where channel listings and message history come from. Every fetch returns
/// records sorted oldest first.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn list_channels(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, SourceError>;

    /// Up to `limit` messages older than `before`, or the latest ones when
    /// `before` is `None`.
    async fn fetch_messages_before(
        &self,
        channel_id: u64,
        limit: u8,
        before: Option<u64>,
    ) -> Result<Vec<MessageRecord>, SourceError>;

    async fn fetch_messages_after(
        &self,
        channel_id: u64,
        limit: u8,
        after: u64,
    ) -> Result<Vec<MessageRecord>, SourceError>;
}

pub struct DiscordSource {
    http: Arc<Http>,
    cache: Option<Arc<Cache>>,
}

impl DiscordSource {
    pub fn new(http: Arc<Http>, cache: Option<Arc<Cache>>) -> Self {
        Self { http, cache }
    }

    fn can_read(&self, channel: &serenity::all::GuildChannel) -> bool {
        let Some(cache) = &self.cache else {
            return true;
        };
        let me = cache.current_user().id;
        match channel.permissions_for_user(cache, me) {
            Ok(perms) => perms.contains(Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY),
            Err(err) => {
                // Guild not cached yet; the backfill fetch decides.
                debug!(channel_id = %channel.id, error = %err, "Permission lookup failed");
                true
            }
        }
    }

    async fn fetch(&self, channel_id: u64, builder: GetMessages) -> Result<Vec<MessageRecord>, SourceError> {
        let _timer = DISCORD_API_DURATION.start_timer();
        let messages = ChannelId::new(channel_id).messages(&self.http, builder).await?;

        let mut records: Vec<MessageRecord> = messages.iter().map(to_record).collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

#[async_trait]
impl MessageSource for DiscordSource {
    async fn list_channels(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, SourceError> {
        let _timer = DISCORD_API_DURATION.start_timer();
        let channels = GuildId::new(guild_id).channels(&self.http).await?;

        let mut infos: Vec<ChannelInfo> = channels
            .values()
            .filter(|c| matches!(c.kind, ChannelType::Text | ChannelType::News))
            .map(|c| ChannelInfo {
                id: c.id.get(),
                name: c.name.clone(),
                readable: self.can_read(c),
            })
            .collect();
        infos.sort_by_key(|c| c.id);
        Ok(infos)
    }

    async fn fetch_messages_before(
        &self,
        channel_id: u64,
        limit: u8,
        before: Option<u64>,
    ) -> Result<Vec<MessageRecord>, SourceError> {
        let mut builder = GetMessages::new().limit(limit);
        if let Some(before) = before.filter(|id| *id != 0) {
            builder = builder.before(MessageId::new(before));
        }
        self.fetch(channel_id, builder).await
    }

    async fn fetch_messages_after(
        &self,
        channel_id: u64,
        limit: u8,
        after: u64,
    ) -> Result<Vec<MessageRecord>, SourceError> {
        let mut builder = GetMessages::new().limit(limit);
        if after != 0 {
            builder = builder.after(MessageId::new(after));
        }
        self.fetch(channel_id, builder).await
    }
}

pub fn to_record(msg: &Message) -> MessageRecord {
    MessageRecord {
        id: msg.id.get(),
        author_id: msg.author.id.get(),
        author_name: msg
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| msg.author.name.clone()),
        content: msg.content.clone(),
        timestamp: DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_default(),
        reaction_count: msg
            .reactions
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.count)),
        attachment_url: first_image(&msg.attachments),
    }
}

fn first_image(attachments: &[Attachment]) -> Option<String> {
    attachments
        .iter()
        .find(|a| is_image(&a.filename, a.content_type.as_deref()))
        .map(|a| a.url.clone())
}

fn is_image(filename: &str, content_type: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        return ct.starts_with("image/");
    }
    filename
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_detection_prefers_content_type() {
        assert!(is_image("blob", Some("image/png")));
        assert!(!is_image("photo.png", Some("video/mp4")));
    }

    #[test]
    fn image_detection_falls_back_to_extension() {
        assert!(is_image("cat.JPG", None));
        assert!(is_image("a.b.webp", None));
        assert!(!is_image("notes.txt", None));
        assert!(!is_image("noextension", None));
    }
}
