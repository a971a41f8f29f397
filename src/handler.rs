use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serenity::{
    all::{
        CommandDataOption, CommandOptionType, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
        CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
        CreateMessage, Interaction, Timestamp,
    },
    async_trait,
    builder::{CreateCommand, CreateCommandOption},
    model::{channel::Message, gateway::Ready, id::GuildId},
    prelude::*,
};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    health::HealthChecker,
    schema::{QuoteRequest, QuoteResult},
    selector::QuoteSelector,
};

/// Arguments of a `quote` command, whichever way it was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuoteArgs {
    pub author_id: Option<u64>,
    pub channel_id: Option<u64>,
}

/// Parses `<prefix>quote [@user] [#channel]`. Returns `None` for anything
/// that isn't a quote command.
pub fn parse_text_command(content: &str, prefix: &str) -> Option<QuoteArgs> {
    let rest = content.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    if words.next()? != "quote" {
        return None;
    }

    let mut args = QuoteArgs::default();
    for word in words {
        if let Some(id) = mention_id(word, "<#") {
            args.channel_id = Some(id);
        } else if let Some(id) = mention_id(word, "<@!").or_else(|| mention_id(word, "<@")) {
            args.author_id = Some(id);
        }
    }
    Some(args)
}

fn mention_id(word: &str, open: &str) -> Option<u64> {
    word.strip_prefix(open)?.strip_suffix('>')?.parse().ok()
}

fn slash_args(options: &[CommandDataOption]) -> QuoteArgs {
    let mut args = QuoteArgs::default();
    for option in options {
        match option.name.as_str() {
            "user" => args.author_id = option.value.as_user_id().map(|id| id.get()),
            "channel" => args.channel_id = option.value.as_channel_id().map(|id| id.get()),
            _ => {}
        }
    }
    args
}

pub fn jump_link(guild_id: u64, channel_id: u64, message_id: u64) -> String {
    format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
}

pub fn quote_embed(guild_id: u64, result: &QuoteResult) -> CreateEmbed {
    let record = &result.record;
    let link = jump_link(guild_id, result.channel.id, record.id);

    let mut embed = CreateEmbed::new()
        .author(CreateEmbedAuthor::new(&record.author_name))
        .description(&record.content)
        .field("Source", format!("[Jump to message]({link})"), false)
        .footer(CreateEmbedFooter::new(format!(
            "#{} · {} reactions",
            result.channel.name, record.reaction_count
        )));

    if let Ok(ts) = Timestamp::from_unix_timestamp(record.timestamp.timestamp()) {
        embed = embed.timestamp(ts);
    }
    if let Some(url) = &record.attachment_url {
        embed = embed.image(url);
    }
    embed
}

pub struct SelectorKey;

impl TypeMapKey for SelectorKey {
    type Value = Arc<QuoteSelector>;
}

pub struct HealthKey;

impl TypeMapKey for HealthKey {
    type Value = Arc<HealthChecker>;
}

/// Selector and health checker live in the client's data map, since they are
/// built from the client's own HTTP handle and cache.
pub struct Handler {
    pub cfg: Config,
    backfill_started: AtomicBool,
}

impl Handler {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            backfill_started: AtomicBool::new(false),
        }
    }

    async fn selector(ctx: &Context) -> Option<Arc<QuoteSelector>> {
        let selector = ctx.data.read().await.get::<SelectorKey>().cloned();
        if selector.is_none() {
            error!("Quote selector missing from client data");
        }
        selector
    }

    fn request(&self, args: QuoteArgs, invoker_id: u64) -> QuoteRequest {
        QuoteRequest {
            author_id: args.author_id,
            channel_id: args.channel_id,
            blacklist: self.cfg.quote_blacklist.clone(),
            invoker_id,
        }
    }

    async fn backfill_once(&self, selector: &QuoteSelector, health: Option<&HealthChecker>) {
        if self.backfill_started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(guild_id = self.cfg.guild_id, "Starting message backfill");
        match selector.registry().backfill(self.cfg.guild_id).await {
            Ok(_) => {
                if let Some(health) = health {
                    health.mark_backfill_done().await;
                }
            }
            Err(err) => {
                error!(error = %err, "Backfill failed, quotes will use live fetches");
                // Let a later reconnect try again.
                self.backfill_started.store(false, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
        let health = ctx.data.read().await.get::<HealthKey>().cloned();
        if let Some(health) = &health {
            health.mark_discord_ready(true).await;
        }

        let guild_id = GuildId::new(self.cfg.guild_id);
        let quote_cmd = CreateCommand::new("quote")
            .description("Quote a random message, favouring popular ones")
            .add_option(CreateCommandOption::new(
                CommandOptionType::User,
                "user",
                "Only quote this user",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Channel,
                "channel",
                "Only quote from this channel",
            ));
        if let Err(err) = guild_id.create_command(&ctx.http, quote_cmd).await {
            error!("Failed to register /quote: {err:?}");
        } else {
            info!("Slash command /quote registered.");
        }

        if let Some(selector) = Self::selector(&ctx).await {
            self.backfill_once(&selector, health.as_deref()).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name != "quote" {
            return;
        }

        let Some(selector) = Self::selector(&ctx).await else {
            return;
        };

        let args = slash_args(&command.data.options);
        info!(?args, user = %command.user.id, "Processing /quote");

        let defer = CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new());
        if let Err(err) = command.create_response(&ctx.http, defer).await {
            error!("Cannot send initial response: {err:?}");
            return;
        }

        let request = self.request(args, command.user.id.get());
        let followup = match selector.select_quote(&request).await {
            Ok(result) => CreateInteractionResponseFollowup::new().embed(quote_embed(self.cfg.guild_id, &result)),
            Err(err) => {
                warn!(error = %err, "Failed to select quote");
                CreateInteractionResponseFollowup::new().content(err.user_message())
            }
        };
        if let Err(err) = command.create_followup(&ctx.http, followup).await {
            error!("Cannot send followup response: {err:?}");
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(args) = parse_text_command(&msg.content, &self.cfg.command_prefix) else {
            return;
        };

        let Some(selector) = Self::selector(&ctx).await else {
            return;
        };

        info!(?args, user = %msg.author.id, "Processing text quote command");
        let request = self.request(args, msg.author.id.get());
        let reply = match selector.select_quote(&request).await {
            Ok(result) => CreateMessage::new().embed(quote_embed(self.cfg.guild_id, &result)),
            Err(err) => {
                warn!(error = %err, "Failed to select quote");
                CreateMessage::new().content(err.user_message())
            }
        };
        if let Err(err) = msg.channel_id.send_message(&ctx.http, reply).await {
            error!("Cannot send quote: {err:?}");
        }
    }
}
