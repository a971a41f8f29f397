use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    cache::{ChannelCacheRegistry, MessageFilter},
    error::QuoteError,
    metrics::{CACHE_MISSES, CHANNEL_ATTEMPTS, QUOTES_SERVED, QUOTE_FAILURES, QUOTE_SELECTION_DURATION},
    sampler::WeightedSampler,
    schema::{ChannelInfo, QuoteRequest, QuoteResult},
};

pub const DEFAULT_SELECTION_DEADLINE: Duration = Duration::from_secs(30);

/// Readable channels, minus the blacklist, narrowed to the named channel if
/// the request names one.
pub fn candidate_channels(channels: Vec<ChannelInfo>, request: &QuoteRequest) -> Vec<ChannelInfo> {
    channels
        .into_iter()
        .filter(|c| c.readable)
        .filter(|c| !request.blacklist.contains(&c.id))
        .filter(|c| request.channel_id.map_or(true, |id| id == c.id))
        .collect()
}

pub struct QuoteSelector {
    registry: Arc<ChannelCacheRegistry>,
    sampler: Mutex<WeightedSampler>,
    guild_id: u64,
    command_prefix: String,
    deadline: Duration,
    shutdown: CancellationToken,
}

impl QuoteSelector {
    pub fn new(registry: Arc<ChannelCacheRegistry>, guild_id: u64, command_prefix: impl Into<String>) -> Self {
        Self {
            registry,
            sampler: Mutex::new(WeightedSampler::from_os_rng()),
            guild_id,
            command_prefix: command_prefix.into(),
            deadline: DEFAULT_SELECTION_DEADLINE,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_sampler(mut self, sampler: WeightedSampler) -> Self {
        self.sampler = Mutex::new(sampler);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn registry(&self) -> &Arc<ChannelCacheRegistry> {
        &self.registry
    }

    pub async fn select_quote(&self, request: &QuoteRequest) -> Result<QuoteResult, QuoteError> {
        let span = info_span!(
            "select_quote",
            request_id = %Uuid::new_v4(),
            invoker = request.invoker_id,
            author = ?request.author_id,
            channel = ?request.channel_id,
        );

        let timer = QUOTE_SELECTION_DURATION.start_timer();
        let result = self.select(request).instrument(span).await;
        timer.observe_duration();

        match &result {
            Ok(_) => QUOTES_SERVED.inc(),
            Err(err) => QUOTE_FAILURES.with_label_values(&[err.kind()]).inc(),
        }
        result
    }

    async fn select(&self, request: &QuoteRequest) -> Result<QuoteResult, QuoteError> {
        let deadline = Instant::now() + self.deadline;

        let channels = self
            .within(deadline, self.registry.list_channels(self.guild_id))
            .await?;
        let mut candidates = candidate_channels(channels, request);
        if candidates.is_empty() {
            return Err(QuoteError::NoEligibleChannels);
        }

        let filter = MessageFilter {
            author_id: request.author_id,
            command_prefix: &self.command_prefix,
        };

        // Each attempt drops one candidate, so this can never run dry early.
        let max_attempts = candidates.len().div_ceil(2);
        for attempt in 1..=max_attempts {
            if self.shutdown.is_cancelled() {
                return Err(QuoteError::Cancelled);
            }
            if Instant::now() >= deadline {
                warn!(attempt, "Deadline passed before next channel attempt");
                return Err(QuoteError::DeadlineExceeded);
            }

            let index = self
                .within(deadline, async { Ok(self.pick_candidate(&candidates, &filter).await) })
                .await?;
            let channel = candidates.swap_remove(index);
            CHANNEL_ATTEMPTS.inc();

            let entry = match self.within(deadline, self.registry.refresh(channel.id)).await {
                Ok(entry) => entry,
                Err(QuoteError::CacheMiss(channel_id)) => {
                    CACHE_MISSES.inc();
                    debug!(channel_id, "Cache miss, fetching live");
                    self.within(deadline, self.registry.load_live(channel)).await?
                }
                Err(err) => return Err(err),
            };

            let mut pool = entry.snapshot(&filter).await;
            if pool.is_empty() {
                debug!(channel_id = entry.info.id, attempt, "No eligible messages in channel");
                continue;
            }

            let selection = self.sampler.lock().sample(&pool)?;
            let record = pool.swap_remove(selection.index);
            info!(
                channel_id = entry.info.id,
                message_id = record.id,
                weight = selection.weight,
                total_weight = selection.total_weight,
                attempt,
                "Selected quote"
            );

            return Ok(QuoteResult {
                record,
                channel: entry.info.clone(),
                weight: selection.weight,
                total_weight: selection.total_weight,
            });
        }

        Err(QuoteError::NoMessagesForUser)
    }

    /// Random candidate index, drawn from the channels whose cache already
    /// holds matching messages when there are any. A ring that is busy right
    /// now does not count as preferred.
    async fn pick_candidate(&self, candidates: &[ChannelInfo], filter: &MessageFilter<'_>) -> usize {
        let mut preferred = Vec::new();
        for (i, channel) in candidates.iter().enumerate() {
            if let Some(entry) = self.registry.get(channel.id).await {
                if entry.try_has_matching(filter) == Some(true) {
                    preferred.push(i);
                }
            }
        }

        let mut sampler = self.sampler.lock();
        match sampler.choose_uniform(preferred.len()) {
            Some(i) => preferred[i],
            None => sampler.choose_uniform(candidates.len()).unwrap_or(0),
        }
    }

    async fn within<T>(
        &self,
        deadline: Instant,
        fut: impl Future<Output = Result<T, QuoteError>>,
    ) -> Result<T, QuoteError> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(QuoteError::Cancelled),
            res = tokio::time::timeout_at(deadline, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(QuoteError::DeadlineExceeded),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u64, readable: bool) -> ChannelInfo {
        ChannelInfo {
            id,
            name: format!("channel-{id}"),
            readable,
        }
    }

    #[test]
    fn candidates_drop_unreadable_and_blacklisted() {
        let channels = vec![channel(1, true), channel(2, false), channel(3, true), channel(4, true)];
        let request = QuoteRequest {
            blacklist: vec![3],
            ..Default::default()
        };

        let ids: Vec<u64> = candidate_channels(channels, &request).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn named_channel_narrows_candidates() {
        let channels = vec![channel(1, true), channel(2, true)];
        let request = QuoteRequest {
            channel_id: Some(2),
            ..Default::default()
        };

        let ids: Vec<u64> = candidate_channels(channels, &request).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn named_blacklisted_channel_leaves_nothing() {
        let channels = vec![channel(1, true), channel(2, true)];
        let request = QuoteRequest {
            channel_id: Some(2),
            blacklist: vec![2],
            ..Default::default()
        };

        assert!(candidate_channels(channels, &request).is_empty());
    }
}
