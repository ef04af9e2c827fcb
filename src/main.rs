use poise::serenity_prelude as serenity;
use rumi::commands::{chat, database, memory, summary};
use rumi::db::NewMessage;
use rumi::{config::Config, Data};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                chat::chat(),
                summary::summary(),
                memory::memory(),
                database::database(),
            ],
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::Message { new_message } = event {
                        if !new_message.author.bot {
                            ingest_message(ctx, new_message, data);
                        }
                    }
                    Ok(())
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Command /{} failed: {}", ctx.command().name, error);
                            let _ = ctx.say("❌ Something went wrong running that command.").await;
                        }
                        other => {
                            if let Err(e) = poise::builtins::on_error(other).await {
                                error!("Error while handling error: {}", e);
                            }
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let db = rumi::db::Database::new(&config)?;
                db.execute_init()?;
                let llm = Arc::new(rumi::llm::LlmClient::new(&config));

                Ok(Data { config, db, llm })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

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

/// Persists an observed guild message. Failures are logged; the gateway
/// loop must keep running regardless.
fn ingest_message(ctx: &serenity::Context, message: &serenity::Message, data: &Data) {
    // DMs have no guild and are not tracked
    let Some(guild_id) = message.guild_id else {
        return;
    };

    let guild_name = guild_id.name(ctx);
    let channel_name = ctx
        .cache
        .channel(message.channel_id)
        .map(|c| c.name.clone());
    let display_name = message
        .author
        .global_name
        .clone()
        .unwrap_or_else(|| message.author.name.clone());

    let result = data.db.store_message(&NewMessage {
        discord_id: &message.id.to_string(),
        guild_id: &guild_id.to_string(),
        guild_name: guild_name.as_deref(),
        channel_id: &message.channel_id.to_string(),
        channel_name: channel_name.as_deref(),
        user_id: &message.author.id.to_string(),
        username: &message.author.name,
        display_name: &display_name,
        content: &message.content,
        timestamp: message.timestamp.unix_timestamp(),
    });

    if let Err(e) = result {
        error!("Failed to store message {}: {}", message.id, e);
    }
}
