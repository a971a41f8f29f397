use std::sync::Arc;

use dotenv::dotenv;
use serenity::prelude::*;
use serenity::Client as DiscordClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quotebot::{
    cache::ChannelCacheRegistry,
    config::{Config, LogFormat},
    handler::{Handler, HealthKey, SelectorKey},
    health::HealthChecker,
    metrics::MetricsRegistry,
    selector::QuoteSelector,
    server,
    source::DiscordSource,
};

type DynErr = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), DynErr> {
    dotenv().ok();

    let cfg = Config::from_env()?;
    init_tracing(cfg.log_format);

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let shutdown = CancellationToken::new();

    let mut client = DiscordClient::builder(&cfg.discord_token, intents)
        .event_handler(Handler::new(cfg.clone()))
        .await?;

    let source = Arc::new(DiscordSource::new(client.http.clone(), Some(client.cache.clone())));
    let registry = Arc::new(
        ChannelCacheRegistry::new(source, cfg.fetch_timeout).with_backfill_pages(cfg.backfill_pages),
    );
    let selector = Arc::new(
        QuoteSelector::new(registry.clone(), cfg.guild_id, cfg.command_prefix.clone())
            .with_deadline(cfg.selection_deadline)
            .with_shutdown(shutdown.clone()),
    );
    let health = Arc::new(HealthChecker::new(registry));

    {
        let mut data = client.data.write().await;
        data.insert::<SelectorKey>(selector);
        data.insert::<HealthKey>(health.clone());
    }

    if let Some(addr) = cfg.metrics_addr {
        let metrics = Arc::new(MetricsRegistry::new());
        tokio::spawn(server::serve(addr, metrics, health, shutdown.clone()));
    }

    let shard_manager = client.shard_manager.clone();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cleanly exiting");
            ctrl_c_shutdown.cancel();
            shard_manager.shutdown_all().await;
        }
    });

    info!("Bot is running");
    if let Err(err) = client.start().await {
        error!("Client error: {err:?}");
    }
    shutdown.cancel();
    Ok(())
}
