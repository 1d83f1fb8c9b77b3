use poise::serenity_prelude as serenity;
use ratbot::automod::{AutoModEvaluator, InboundMessage, SerenityActions};
use ratbot::expiries::ExpiryDispatcher;
use ratbot::services::{expiry::ExpiryService, moderation::ModerationService};
use ratbot::{commands, config::Config, db::Database, Data};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXPIRY_BATCH_SIZE: usize = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();

    let db = Database::new(&config)?;
    db.execute_init()?;

    let mut owners = HashSet::new();
    if let Some(owner_id) = config.owner_id {
        owners.insert(serenity::UserId::new(owner_id));
    }

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            owners,
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    match event {
                        serenity::FullEvent::Message { new_message } => {
                            let Some(message) = InboundMessage::from_message(new_message) else {
                                return Ok(());
                            };
                            let actions = SerenityActions::from_context(ctx, data.bot_id);
                            if let Err(e) = data
                                .automod
                                .handle_message(&data.db, &actions, &message)
                                .await
                            {
                                error!(
                                    "Auto-mod failed for message {} in guild {}: {}",
                                    message.message_id, message.guild_id, e
                                );
                            }
                        }
                        serenity::FullEvent::GuildCreate { guild, is_new } => {
                            if *is_new == Some(true) {
                                info!("Joined guild {} ({})", guild.name, guild.id);
                                if let Err(e) = data.moderation.ensure_settings(guild.id.get()).await {
                                    warn!("Failed to create default settings for {}: {}", guild.id, e);
                                }
                            }
                        }
                        _ => {}
                    }
                    Ok(())
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    if let poise::FrameworkError::Command { error, ctx, .. } = error {
                        error!("Command '{}' failed: {}", ctx.command().name, error);
                        let _ = ctx.say("❌ Something went wrong while running that command.").await;
                    } else if let Err(e) = poise::builtins::on_error(error).await {
                        error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot is ready as {}!", ready.user.name);
                let bot_id = ready.user.id;

                if config.register_commands {
                    let commands = &framework.options().commands;
                    match config.dev_guild_id {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(ctx, commands, serenity::GuildId::new(guild_id))
                                .await?;
                            info!("Registered commands in dev guild {}", guild_id);
                        }
                        None => {
                            poise::builtins::register_globally(ctx, commands).await?;
                            info!("Registered commands globally");
                        }
                    }
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let moderation = ModerationService::new(db.clone());
                let expiries = ExpiryService::new(db.clone());

                let dispatcher = ExpiryDispatcher::new(
                    expiries.clone(),
                    moderation.clone(),
                    Arc::new(SerenityActions::from_context(ctx, bot_id)),
                    config.expiry_poll_interval_secs,
                    EXPIRY_BATCH_SIZE,
                );
                tokio::spawn(dispatcher.run());

                if config.modlog_retention_days > 0 {
                    tokio::spawn(ratbot::retention::start_cleanup_task(
                        db.clone(),
                        config.modlog_retention_days,
                        config.modlog_cleanup_interval_secs,
                    ));
                }

                let automod = AutoModEvaluator::with_system_clock(
                    config.spam_tracker_capacity,
                    config.automod_master_switch,
                );
                info!("Auto-mod master switch policy: {}", automod.master_switch());

                Ok(Data {
                    config,
                    db,
                    moderation,
                    expiries,
                    automod,
                    bot_id,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
