use crate::commands::say_chunked;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Explore database structure and user tables
#[poise::command(
    slash_command,
    guild_only,
    subcommands("schema", "users", "user_stats", "user_messages", "tables")
)]
pub async fn database(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the database schema
#[poise::command(slash_command)]
pub async fn schema(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let info = ctx.data().db.schema_info()?;

    let mut out = String::from("🗄️ **Database Schema**\n\n**Core Tables:**\n");
    for table in &info {
        out.push_str(&format!("• `{}` — {}\n", table.name, table.columns.join(", ")));
    }
    out.push_str(
        "\n**Dynamic Tables:**\n\
         • `user_messages_{user_id}` — per-user message shard, created on a \
         user's first message, kept in sync with `messages`.\n",
    );
    say_chunked(&ctx, &out).await?;
    Ok(())
}

/// List users known to the database
#[poise::command(slash_command)]
pub async fn users(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().map(|g| g.to_string());
    let users = ctx.data().db.list_users(guild_id.as_deref(), 20)?;

    if users.is_empty() {
        ctx.say("No users found in database.").await?;
        return Ok(());
    }

    let mut out = String::from("👥 **Users in Database**\n");
    for user in users {
        let count = match user.guild_messages {
            Some(n) => format!("{} messages in this guild", n),
            None => format!("{} total messages", user.total_messages),
        };
        out.push_str(&format!(
            "\n• **{}** (@{}) — {} (last seen: {})",
            user.display_name, user.username, count, user.last_seen
        ));
    }
    say_chunked(&ctx, &out).await?;
    Ok(())
}

/// Show detailed statistics for a user
#[poise::command(slash_command)]
pub async fn user_stats(
    ctx: Context<'_>,
    #[description = "User to examine"] user: serenity::User,
) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let guild_id = ctx.guild_id().map(|g| g.to_string()).unwrap_or_default();
    let user_id = user.id.to_string();

    let Some(stats) = data.db.user_stats(&user_id, &guild_id)? else {
        ctx.say(format!("No data found for {} in database.", user.name))
            .await?;
        return Ok(());
    };

    let mut out = format!(
        "📊 **User Statistics: {}**\n\n\
         **Basic Info:**\n\
         • Username: @{}\n\
         • User ID: `{}`\n\n\
         **Activity:**\n\
         • Total messages: {}\n\
         • First seen: {}\n\
         • Last seen: {}\n\n\
         **This Guild:**\n\
         • Messages: {}\n\
         • Avg words/message: {:.1}\n",
        stats.display_name,
        stats.username,
        stats.user_id,
        stats.total_messages,
        stats.first_seen,
        stats.last_seen,
        stats.guild_message_count,
        stats.avg_word_count,
    );
    if let (Some(first), Some(last)) = (&stats.first_message, &stats.last_message) {
        out.push_str(&format!("• First message: {}\n• Last message: {}\n", first, last));
    }
    out.push_str(&format!(
        "\n**Database:**\n• Has dedicated table: {}\n",
        if stats.has_shard_table { "✅" } else { "❌" }
    ));

    if let Some(profile) = data.db.get_user_profile(&user_id, &guild_id)? {
        let words = profile
            .top_words
            .iter()
            .map(|(w, c)| format!("{} ({}×)", w, c))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "\n**Profile Analysis:**\n• Analyzed messages: {}\n• Frequent words: {}\n",
            profile.message_count, words
        ));
    }

    ctx.say(out).await?;
    Ok(())
}

/// Show recent messages from a user's dedicated table
#[poise::command(slash_command)]
pub async fn user_messages(
    ctx: Context<'_>,
    #[description = "User to examine"] user: serenity::User,
) -> Result<(), Error> {
    ctx.defer().await?;

    let guild_id = ctx.guild_id().map(|g| g.to_string()).unwrap_or_default();
    let messages = ctx
        .data()
        .db
        .user_messages(&user.id.to_string(), Some(&guild_id), 10)?;

    if messages.is_empty() {
        ctx.say(format!(
            "No messages found for {} in their dedicated table.",
            user.name
        ))
        .await?;
        return Ok(());
    }

    let total = messages.len();
    let mut out = format!("💬 **Recent Messages from {}'s Table**\n", user.name);
    for msg in messages.iter().rev().take(5).rev() {
        let preview: String = msg.content.chars().take(100).collect();
        let ellipsis = if msg.content.chars().count() > 100 { "..." } else { "" };
        out.push_str(&format!(
            "\n**{}** ({} words): {}{}\n",
            msg.timestamp, msg.word_count, preview, ellipsis
        ));
    }
    out.push_str(&format!("\n*Showing {} of {} recent messages*", total.min(5), total));

    say_chunked(&ctx, &out).await?;
    Ok(())
}

/// List all tables in the database
#[poise::command(slash_command)]
pub async fn tables(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let listing = ctx.data().db.list_tables()?;

    let core = listing
        .core
        .iter()
        .map(|t| format!("• `{}`", t))
        .collect::<Vec<_>>()
        .join("\n");
    let shards = listing
        .shards
        .iter()
        .take(10)
        .map(|t| format!("• `{}`", t))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = format!(
        "🗃️ **Database Tables**\n\n**Core Tables ({}):**\n{}\n\n**User Message Tables ({}):**\n{}",
        listing.core.len(),
        core,
        listing.shards.len(),
        shards
    );
    if listing.shards.len() > 10 {
        out.push_str(&format!("\n• ... and {} more user tables", listing.shards.len() - 10));
    }

    say_chunked(&ctx, &out).await?;
    Ok(())
}
