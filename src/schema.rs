use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub reaction_count: u64,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: u64,
    pub name: String,
    pub readable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QuoteRequest {
    pub author_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub blacklist: Vec<u64>,
    pub invoker_id: u64,
}

#[derive(Debug, Clone)]
pub struct QuoteResult {
    pub record: MessageRecord,
    pub channel: ChannelInfo,
    pub weight: u64,
    pub total_weight: u64,
}
