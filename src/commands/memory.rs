use crate::analyze::{peak_hour, PatternAnalyzer};
use crate::commands::say_chunked;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Manage Rumi's memory and context
#[poise::command(
    slash_command,
    guild_only,
    subcommands("status", "context", "analyze", "cleanup")
)]
pub async fn memory(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show current memory status for this channel
#[poise::command(slash_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let channel_id = ctx.channel_id().to_string();
    let hours = data.config.context_hours;

    let recent = data.db.count_messages_since(&channel_id, hours)?;
    let summaries = data.db.count_summaries(&channel_id)?;

    let status = format!(
        "🧠 **Rumi's Memory Status**\n\n\
         **Current Channel:**\n\
         • Recent messages ({hours}h): {recent}\n\
         • Stored summaries: {summaries}\n\n\
         **Memory Health:**\n\
         • Database: ✅ Active\n\
         • Model: {}\n\n\
         Use `/memory context` to see conversation history or \
         `/memory analyze <user>` to analyze someone's communication patterns.",
        data.config.ai_model
    );
    ctx.say(status).await?;
    Ok(())
}

/// Show recent conversation context (stored summaries)
#[poise::command(slash_command)]
pub async fn context(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let guild_id = ctx.guild_id().map(|g| g.to_string()).unwrap_or_default();
    let channel_id = ctx.channel_id().to_string();

    let summaries = data
        .db
        .summaries_since(&guild_id, &channel_id, data.config.context_days_back)?;

    if summaries.is_empty() {
        ctx.say("🧠 No recent conversation context available.").await?;
        return Ok(());
    }

    let mut out = String::from("🧠 **Conversation Context**\n");
    for record in summaries {
        out.push_str(&format!(
            "\n**{}** ({} messages, {}):\n{}\n---\n",
            record.created_at, record.message_count, record.window_label, record.summary
        ));
    }
    say_chunked(&ctx, &out).await?;
    Ok(())
}

/// Analyze a user's communication patterns
#[poise::command(slash_command)]
pub async fn analyze(
    ctx: Context<'_>,
    #[description = "User to analyze"] user: serenity::User,
) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let guild_id = ctx.guild_id().map(|g| g.to_string()).unwrap_or_default();
    let user_id = user.id.to_string();

    let analyzer = PatternAnalyzer::new(data.db.clone(), data.config.analysis_message_limit);
    let profile = data
        .db
        .run_blocking(move |_| analyzer.analyze(&user_id, &guild_id))
        .await?;

    let Some(profile) = profile else {
        ctx.say(format!("No messages found for {} in this guild.", user.name))
            .await?;
        return Ok(());
    };

    let topics = if profile.top_words.is_empty() {
        "None identified".to_string()
    } else {
        profile
            .top_words
            .iter()
            .map(|(word, count)| format!("{} ({}×)", word, count))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let peak = peak_hour(&profile.active_hours)
        .map(|h| format!("{:02}:00 UTC", h))
        .unwrap_or_else(|| "unknown".to_string());

    let response = format!(
        "🔍 **User Analysis: {}**\n\n\
         • Messages analyzed: {}\n\
         • Avg words per message: {:.1}\n\
         • Most active hour: {}\n\
         • Frequent words: {}\n\n\
         *This analysis has been saved to my memory.*",
        user.name, profile.message_count, profile.avg_word_count, peak, topics
    );
    ctx.say(response).await?;
    Ok(())
}

/// Clean up old messages and outdated summaries
#[poise::command(slash_command)]
pub async fn cleanup(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    info!("Memory cleanup requested by user {}", ctx.author().id);

    let message_days = data.config.retention_days;
    let summary_days = data.config.summary_retention_days;
    let report = data
        .db
        .run_blocking(move |db| db.cleanup_old_data(message_days, summary_days))
        .await?;

    ctx.say(format!(
        "🧹 **Memory Cleanup Complete**\n\n\
         Removed {} messages (older than {} days), {} shard rows, \
         and {} summaries (older than {} days).",
        report.messages_deleted,
        message_days,
        report.shard_rows_deleted,
        report.summaries_deleted,
        summary_days
    ))
    .await?;
    Ok(())
}
