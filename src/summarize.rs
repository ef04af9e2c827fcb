//! Summarization orchestrator: resolves a context window through the
//! query layer, prompts the completion backend, and persists the result.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

use crate::db::{Database, StoredMessage};
use crate::llm::CompletionBackend;
use crate::system_prompt;

/// How far back a summary should look.
#[derive(Debug, Clone, Copy)]
pub enum SummaryWindow {
    Messages(u32),
    Hours(u32),
    Days(u32),
}

impl SummaryWindow {
    pub fn label(&self) -> String {
        match self {
            SummaryWindow::Messages(n) => format!("last {} messages", n),
            SummaryWindow::Hours(n) => format!("last {} hour(s)", n),
            SummaryWindow::Days(n) => format!("last {} day(s)", n),
        }
    }
}

#[derive(Debug)]
pub enum SummaryOutcome {
    /// The window held no messages; nothing was persisted.
    Empty,
    Generated(GeneratedSummary),
}

#[derive(Debug)]
pub struct GeneratedSummary {
    pub text: String,
    pub message_count: usize,
    pub total_words: i64,
    pub window_label: String,
}

pub struct Summarizer {
    db: Database,
    backend: Arc<dyn CompletionBackend>,
    max_messages: usize,
}

impl Summarizer {
    pub fn new(db: Database, backend: Arc<dyn CompletionBackend>, max_messages: usize) -> Self {
        Self {
            db,
            backend,
            max_messages,
        }
    }

    /// Summarizes the requested window for a channel. The window is
    /// clamped to `max_messages` to bound prompt size. Exactly one
    /// summary row is persisted on success; a backend failure persists
    /// nothing and is never retried here.
    pub async fn summarize(
        &self,
        guild_id: &str,
        channel_id: &str,
        window: SummaryWindow,
    ) -> anyhow::Result<SummaryOutcome> {
        let label = window.label();
        let messages = self.resolve_window(channel_id, window)?;

        if messages.is_empty() {
            info!("Summarizer: nothing to summarize in channel {} ({})", channel_id, label);
            return Ok(SummaryOutcome::Empty);
        }

        let prior = self.db.latest_summary(channel_id)?;
        let prompt = build_prompt(&label, prior.as_ref().map(|p| p.summary.as_str()), &messages);

        let text = self
            .backend
            .complete(system_prompt::RUMI_PERSONALITY, &prompt)
            .await?;

        self.db
            .save_summary(guild_id, channel_id, &text, messages.len(), &label)?;
        info!(
            "Summarizer: stored summary of {} messages for channel {}",
            messages.len(),
            channel_id
        );

        let total_words = messages.iter().map(|m| m.word_count).sum();
        Ok(SummaryOutcome::Generated(GeneratedSummary {
            text,
            message_count: messages.len(),
            total_words,
            window_label: label,
        }))
    }

    /// Resolves the window into a chronological, bounded message set.
    fn resolve_window(
        &self,
        channel_id: &str,
        window: SummaryWindow,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        match window {
            SummaryWindow::Messages(n) => {
                let limit = (n as usize).min(self.max_messages);
                let mut messages = self.db.recent_messages(channel_id, limit)?;
                messages.reverse();
                Ok(messages)
            }
            SummaryWindow::Hours(n) => self.timeframe(channel_id, Duration::hours(n as i64)),
            SummaryWindow::Days(n) => self.timeframe(channel_id, Duration::days(n as i64)),
        }
    }

    fn timeframe(&self, channel_id: &str, back: Duration) -> anyhow::Result<Vec<StoredMessage>> {
        let now = Utc::now().timestamp();
        let start = now - back.num_seconds();
        self.db
            .messages_in_timeframe(channel_id, start, now, self.max_messages)
    }
}

fn build_prompt(label: &str, prior_summary: Option<&str>, messages: &[StoredMessage]) -> String {
    let mut transcript = String::new();
    for msg in messages {
        transcript.push_str(&format!("{}: {}\n", msg.author_name, msg.content));
    }

    let prior = prior_summary.unwrap_or("No previous context available.");

    format!(
        "You're summarizing a Discord conversation from the {label}. {datetime}\n\
         \n\
         ADAPT YOUR RESPONSE TO THE ACTUAL CONTENT:\n\
         - Deep discussion -> detailed analysis\n\
         - Shitposting and spam -> acknowledge the absurdity with humor\n\
         - Mixed -> capture both aspects\n\
         - Nothing happened -> be brief and witty about the void\n\
         \n\
         Use this structure as a guide, not a template: The Vibe (always), Core Ideas, \
         Arguments, Brilliant Moments, Comedy Gold, Social Dynamics, Open Questions.\n\
         \n\
         PREVIOUS CONTEXT:\n{prior}\n\
         \n\
         [CONVERSATION LOGS START]\n{transcript}[CONVERSATION LOGS END]\n\
         \n\
         Based on the conversation above: preserve technical accuracy, quote verbatim when \
         someone says something brilliant or hilarious, capture interpersonal subtext, and \
         show how ideas evolved rather than just the end state. Connect to the previous \
         context where it is relevant.",
        datetime = system_prompt::datetime_context(),
    )
}
