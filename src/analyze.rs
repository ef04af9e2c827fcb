//! Deterministic per-user communication-pattern analysis.
//!
//! Reads the user's shard table, computes aggregate statistics, and
//! overwrites the user's profile row. No LLM call is involved; the same
//! stored messages always produce the same profile.

use chrono::{NaiveDateTime, Timelike};
use std::collections::HashMap;
use tracing::info;

use crate::db::{Database, ShardMessage, UserProfile};

const TOP_WORD_COUNT: usize = 5;
const MIN_WORD_LEN: usize = 4;

/// Common filler words excluded from keyword frequency.
const STOPWORDS: &[&str] = &[
    "that", "this", "with", "have", "just", "like", "what", "about", "they",
    "them", "then", "than", "there", "their", "would", "could", "should",
    "when", "where", "will", "your", "from", "been", "were", "because",
    "really", "some", "dont", "youre", "thats", "into", "only", "also",
];

pub struct PatternAnalyzer {
    db: Database,
    message_limit: usize,
}

impl PatternAnalyzer {
    pub fn new(db: Database, message_limit: usize) -> Self {
        Self { db, message_limit }
    }

    /// Recomputes the profile for a user in a guild from scratch and
    /// overwrites the stored row. Returns None when the user has no
    /// messages yet, which is a valid state rather than an error.
    pub fn analyze(&self, user_id: &str, guild_id: &str) -> anyhow::Result<Option<UserProfile>> {
        let messages = self
            .db
            .user_messages(user_id, Some(guild_id), self.message_limit)?;

        if messages.is_empty() {
            return Ok(None);
        }

        let total_words: i64 = messages.iter().map(|m| m.word_count).sum();
        let profile = UserProfile {
            user_id: user_id.to_string(),
            guild_id: guild_id.to_string(),
            message_count: messages.len() as i64,
            avg_word_count: total_words as f64 / messages.len() as f64,
            active_hours: hour_histogram(&messages),
            top_words: top_words(&messages, TOP_WORD_COUNT),
        };

        self.db.upsert_user_profile(&profile)?;
        info!(
            "Analyzer: profile recomputed for user {} in guild {} ({} messages)",
            user_id,
            guild_id,
            profile.message_count
        );
        Ok(Some(profile))
    }
}

/// Message count per UTC hour of day, 24 bins.
fn hour_histogram(messages: &[ShardMessage]) -> Vec<u32> {
    let mut hours = vec![0u32; 24];
    for msg in messages {
        if let Ok(ts) = NaiveDateTime::parse_from_str(&msg.timestamp, "%Y-%m-%d %H:%M:%S") {
            hours[ts.hour() as usize] += 1;
        }
    }
    hours
}

/// Index of the busiest hour, or None if the histogram is empty.
pub fn peak_hour(hours: &[u32]) -> Option<usize> {
    let max = *hours.iter().max()?;
    if max == 0 {
        return None;
    }
    hours.iter().position(|&h| h == max)
}

/// Most frequent words across the messages, lowercased and stripped of
/// punctuation. Ties are broken alphabetically so the output is stable.
fn top_words(messages: &[ShardMessage], n: usize) -> Vec<(String, u32)> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for msg in messages {
        for raw in msg.content.split_whitespace() {
            let word: String = raw
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.len() < MIN_WORD_LEN || !word.chars().all(|c| c.is_alphabetic()) {
                continue;
            }
            if STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(String, u32)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(n);
    sorted
}
