// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::antinuke::AntinukeService;
use crate::discord::antinuke::commands as antinuke_commands;
use crate::discord::antinuke::events as antinuke_events;
use crate::discord::antinuke::gateway::{
    SerenityAuditLogReader, SerenityGuildActions, SerenityModerationLog,
};
use crate::discord::{Data, Error};
use crate::infra::antinuke::SqliteConfigStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Event handler for non-command Discord events.
/// Everything the antinuke watches flows through here.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let Err(e) = antinuke_events::dispatch(ctx, event, data).await {
        tracing::error!("Error handling antinuke event: {}", e);
    }
    Ok(())
}

/// Bot operator accounts, exempt from punishment everywhere.
fn global_owner_ids() -> Vec<u64> {
    std::env::var("BOT_OWNER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|part| part.trim().parse::<u64>().ok())
        .collect()
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory for SQLite files");
    let antinuke_db_path = format!("{}/antinuke.db", data_dir);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // The config store can be built now; the gateway adapters need the
    // serenity http/cache handles, so the engine itself is assembled in the
    // framework setup callback below.

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", antinuke_db_path))
        .await
        .expect("Failed to connect to antinuke DB");
    let config_store = SqliteConfigStore::new(pool);
    config_store
        .migrate()
        .await
        .expect("Failed to migrate antinuke DB");

    let global_owners = global_owner_ids();

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MODERATION
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT; // Required for mention inspection

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![antinuke_commands::antinuke()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                println!("🤖 Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let http = ctx.http.clone();
                let cache = ctx.cache.clone();
                let engine = AntinukeService::new(
                    config_store,
                    SerenityAuditLogReader::new(http.clone(), cache.clone()),
                    SerenityGuildActions::new(http.clone(), cache),
                    SerenityModerationLog::new(http),
                )
                .with_global_owners(global_owners);

                println!("✅ Commands registered!");
                println!("🚀 Bot is ready!");

                Ok(Data {
                    antinuke: Arc::new(engine),
                })
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
