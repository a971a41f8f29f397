use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static::lazy_static! {
    // Quote metrics
    pub static ref QUOTES_SERVED: Counter = Counter::with_opts(
        Opts::new("quotebot_quotes_served_total", "Total number of quotes served")
    ).unwrap();

    pub static ref QUOTE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("quotebot_quote_failures_total", "Quote selections that ended in an error"),
        &["kind"]
    ).unwrap();

    pub static ref QUOTE_SELECTION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("quotebot_quote_selection_duration_seconds", "Time spent selecting a quote")
    ).unwrap();

    pub static ref CHANNEL_ATTEMPTS: Counter = Counter::with_opts(
        Opts::new("quotebot_channel_attempts_total", "Channels tried while selecting quotes")
    ).unwrap();

    // Cache metrics
    pub static ref CACHE_MISSES: Counter = Counter::with_opts(
        Opts::new("quotebot_cache_misses_total", "Channel lookups that fell back to a live fetch")
    ).unwrap();

    pub static ref MESSAGES_BACKFILLED: Counter = Counter::with_opts(
        Opts::new("quotebot_messages_backfilled_total", "Messages cached by the startup backfill")
    ).unwrap();

    pub static ref MESSAGES_REFRESHED: Counter = Counter::with_opts(
        Opts::new("quotebot_messages_refreshed_total", "Messages added to caches by refreshes")
    ).unwrap();

    pub static ref CACHED_CHANNELS: Gauge = Gauge::with_opts(
        Opts::new("quotebot_cached_channels", "Number of channels with a message cache")
    ).unwrap();

    // Discord API metrics
    pub static ref DISCORD_API_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("quotebot_discord_api_duration_seconds", "Time spent on Discord API calls")
    ).unwrap();
}

pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(QUOTES_SERVED.clone()),
            Box::new(QUOTE_FAILURES.clone()),
            Box::new(QUOTE_SELECTION_DURATION.clone()),
            Box::new(CHANNEL_ATTEMPTS.clone()),
            Box::new(CACHE_MISSES.clone()),
            Box::new(MESSAGES_BACKFILLED.clone()),
            Box::new(MESSAGES_REFRESHED.clone()),
            Box::new(CACHED_CHANNELS.clone()),
            Box::new(DISCORD_API_DURATION.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }

        Self { registry }
    }

    pub fn gather_metrics(&self) -> String {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&metric_families).unwrap_or_else(|e| {
            error!("Failed to encode metrics: {}", e);
            String::new()
        })
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
