use crate::commands::say_chunked;
use crate::summarize::{Summarizer, SummaryOutcome, SummaryWindow};
use crate::{Context, Error};
use tracing::error;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum Timeframe {
    #[name = "Hours"]
    Hours,
    #[name = "Days"]
    Days,
    #[name = "Messages"]
    Messages,
}

/// Get a summary of recent chat activity
#[poise::command(slash_command, guild_only)]
pub async fn summary(
    ctx: Context<'_>,
    #[description = "Choose time period or message count"] timeframe: Option<Timeframe>,
    #[description = "Number (e.g. 6 for '6 hours' or 100 for messages)"]
    #[min = 1]
    #[max = 1000]
    amount: Option<u32>,
) -> Result<(), Error> {
    ctx.defer().await?;

    let Some(guild_id) = ctx.guild_id() else {
        ctx.say("This command only works inside a guild.").await?;
        return Ok(());
    };
    let channel_id = ctx.channel_id().to_string();

    let window = match timeframe {
        None => SummaryWindow::Days(amount.unwrap_or(2)),
        Some(Timeframe::Hours) => SummaryWindow::Hours(amount.unwrap_or(6)),
        Some(Timeframe::Days) => SummaryWindow::Days(amount.unwrap_or(2)),
        Some(Timeframe::Messages) => SummaryWindow::Messages(amount.unwrap_or(100)),
    };

    let data = ctx.data();
    let summarizer = Summarizer::new(
        data.db.clone(),
        data.llm.clone(),
        data.config.summary_max_messages,
    );

    match summarizer
        .summarize(&guild_id.to_string(), &channel_id, window)
        .await
    {
        Ok(SummaryOutcome::Empty) => {
            ctx.say(format!("No messages found in the {}.", window.label()))
                .await?;
        }
        Ok(SummaryOutcome::Generated(generated)) => {
            let header = format!(
                "📊 **Summary Stats**\n\
                 • Period: {}\n\
                 • Messages analyzed: {}\n\
                 • Total words: ~{}\n\n---\n\n",
                generated.window_label, generated.message_count, generated.total_words
            );
            say_chunked(&ctx, &format!("{}{}", header, generated.text)).await?;
        }
        Err(e) => {
            error!("Summary command failed in channel {}: {}", channel_id, e);
            ctx.say(format!("❌ Error generating summary: {}", e)).await?;
        }
    }

    Ok(())
}
