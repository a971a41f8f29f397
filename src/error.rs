use std::time::Duration;
use thiserror::Error;

/// Failure talking to the chat platform.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Discord API error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum QuoteError {
    /// Sampler called with nothing to sample from. Callers must rule this out.
    #[error("weighted sampler invoked on an empty pool")]
    EmptyPool,

    #[error("no cache entry for channel {0}")]
    CacheMiss(u64),

    #[error("no readable, non-blacklisted channels to quote from")]
    NoEligibleChannels,

    #[error("no cached messages for the requested user")]
    NoMessagesForUser,

    #[error("{operation} failed for {target_id}: {source}")]
    Network {
        target_id: u64,
        operation: &'static str,
        #[source]
        source: SourceError,
    },

    #[error("quote selection deadline exceeded")]
    DeadlineExceeded,

    #[error("quote selection cancelled")]
    Cancelled,
}

impl QuoteError {
    /// The single line shown to whoever invoked the command.
    pub fn user_message(&self) -> &'static str {
        match self {
            QuoteError::NoEligibleChannels => "Couldn't find any messages to quote.",
            QuoteError::NoMessagesForUser => "Couldn't find any messages from that user.",
            QuoteError::DeadlineExceeded | QuoteError::Cancelled => {
                "Took too long looking for a quote, try again in a bit."
            }
            QuoteError::Network { .. } => "Couldn't reach Discord to look for a quote.",
            QuoteError::EmptyPool | QuoteError::CacheMiss(_) => {
                "Sorry, I encountered an error while looking for a quote."
            }
        }
    }

    /// Short label used for the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            QuoteError::EmptyPool => "empty_pool",
            QuoteError::CacheMiss(_) => "cache_miss",
            QuoteError::NoEligibleChannels => "no_eligible_channels",
            QuoteError::NoMessagesForUser => "no_messages_for_user",
            QuoteError::Network { .. } => "network",
            QuoteError::DeadlineExceeded => "deadline_exceeded",
            QuoteError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Expected {0} in env")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_messages_distinguish_empty_results() {
        assert_ne!(
            QuoteError::NoEligibleChannels.user_message(),
            QuoteError::NoMessagesForUser.user_message()
        );
    }

    #[test]
    fn network_error_names_operation_and_target() {
        let err = QuoteError::Network {
            target_id: 42,
            operation: "refresh",
            source: SourceError::Timeout(Duration::from_secs(3)),
        };
        let text = err.to_string();
        assert!(text.contains("refresh"));
        assert!(text.contains("42"));
        assert_eq!(err.kind(), "network");
    }
}
