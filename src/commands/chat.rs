use crate::chat::ChatResponder;
use crate::commands::say_chunked;
use crate::{Context, Error};
use tracing::error;

/// Chat with Rumi (with recent channel context)
#[poise::command(slash_command, guild_only)]
pub async fn chat(
    ctx: Context<'_>,
    #[description = "What do you want to say to Rumi?"] prompt: String,
    #[description = "How many recent messages to include for context"]
    #[min = 0]
    #[max = 100]
    context_messages: Option<u32>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let guild_id = ctx.guild_id().map(|g| g.to_string()).unwrap_or_default();
    let channel_id = ctx.channel_id().to_string();
    let user_id = ctx.author().id.to_string();

    let responder = ChatResponder::new(
        data.db.clone(),
        data.llm.clone(),
        data.config.chat_context_limit,
    );

    match responder
        .respond(
            &guild_id,
            &channel_id,
            &user_id,
            &prompt,
            context_messages.unwrap_or(20) as usize,
        )
        .await
    {
        Ok(reply) => say_chunked(&ctx, &reply).await?,
        Err(e) => {
            error!("Chat command failed in channel {}: {}", channel_id, e);
            ctx.say(format!("❌ Error generating reply: {}", e)).await?;
        }
    }

    Ok(())
}
