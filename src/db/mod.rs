use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::Config;

pub mod schema;

/// A conversation thread is closed once the channel has been quiet for
/// this long; the next message starts a new thread row.
const THREAD_GAP_SECS: i64 = 1800;

/// An inbound message about to be ingested. Registry names are optional
/// because the gateway does not always have them cached; existing names
/// are kept when they are missing.
pub struct NewMessage<'a> {
    pub discord_id: &'a str,
    pub guild_id: &'a str,
    pub guild_name: Option<&'a str>,
    pub channel_id: &'a str,
    pub channel_name: Option<&'a str>,
    pub user_id: &'a str,
    pub username: &'a str,
    pub display_name: &'a str,
    pub content: &'a str,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub user_id: String,
    pub author_name: String,
    pub content: String,
    pub timestamp: String,
    pub word_count: i64,
}

#[derive(Debug, Clone)]
pub struct ShardMessage {
    pub message_id: i64,
    pub guild_id: String,
    pub channel_id: String,
    pub content: String,
    pub timestamp: String,
    pub word_count: i64,
}

#[derive(Debug, Clone)]
pub struct UserStats {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub total_messages: i64,
    pub first_seen: String,
    pub last_seen: String,
    pub guild_message_count: i64,
    pub avg_word_count: f64,
    pub first_message: Option<String>,
    pub last_message: Option<String>,
    pub has_shard_table: bool,
}

#[derive(Debug, Clone)]
pub struct UserListEntry {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub total_messages: i64,
    pub last_seen: String,
    pub guild_messages: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SummaryRecord {
    pub id: i64,
    pub summary: String,
    pub message_count: i64,
    pub window_label: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub guild_id: String,
    pub message_count: i64,
    pub avg_word_count: f64,
    /// Message count per UTC hour, 24 entries.
    pub active_hours: Vec<u32>,
    pub top_words: Vec<(String, u32)>,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub messages_deleted: usize,
    pub shard_rows_deleted: usize,
    pub summaries_deleted: usize,
}

#[derive(Debug)]
pub struct TableListing {
    pub core: Vec<String>,
    pub shards: Vec<String>,
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    known_shards: Arc<Mutex<HashSet<String>>>,
}

impl Database {
    pub fn new(config: &Config) -> rusqlite::Result<Self> {
        let conn = Connection::open(&config.database_url)?;
        // Enforced regardless of how the linked SQLite was compiled;
        // writers must create parent rows first and deleters must
        // remove referencing rows first.
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            known_shards: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Creates the core schema and seeds the known-shard set from
    /// tables left over by previous runs. Idempotent; fatal errors
    /// propagate to the caller.
    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(schema::CORE_SCHEMA)?;

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name LIKE ?1",
        )?;
        let pattern = format!("{}%", schema::SHARD_PREFIX);
        let existing: Vec<String> = stmt
            .query_map([pattern], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        let mut known = self.known_shards.lock().unwrap();
        let count = existing.len();
        known.extend(existing);
        debug!("Database: Schema ready, {} user shard tables found", count);
        Ok(())
    }

    /// Creates the per-user shard table if absent and returns its name.
    /// After the first call for a user the known-shard set short-circuits
    /// the DDL, keeping it off the ingest hot path.
    pub fn ensure_user_shard(&self, user_id: &str) -> anyhow::Result<String> {
        let table = schema::shard_table_name(user_id);
        {
            let known = self.known_shards.lock().unwrap();
            if known.contains(&table) {
                return Ok(table);
            }
        }
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(&schema::shard_table_ddl(&table), [])?;
        }
        self.known_shards.lock().unwrap().insert(table.clone());
        debug!("Database: Created shard table {}", table);
        Ok(table)
    }

    /// Ingests one message: upserts the guild/channel/user registry rows,
    /// then writes the unified row and the shard row in one transaction so
    /// the two views cannot drift apart. Returns false for a duplicate
    /// discord_id, which leaves every table untouched.
    pub fn store_message(&self, msg: &NewMessage<'_>) -> anyhow::Result<bool> {
        let shard = self.ensure_user_shard(msg.user_id)?;
        let word_count = msg.content.split_whitespace().count() as i64;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO guilds (guild_id, guild_name, last_activity)
             VALUES (?1, ?2, datetime(?3, 'unixepoch'))
             ON CONFLICT(guild_id) DO UPDATE SET
                 guild_name = COALESCE(excluded.guild_name, guild_name),
                 last_activity = excluded.last_activity",
            (msg.guild_id, msg.guild_name, msg.timestamp),
        )?;

        tx.execute(
            "INSERT INTO channels (channel_id, guild_id, channel_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET
                 channel_name = COALESCE(excluded.channel_name, channel_name)",
            (msg.channel_id, msg.guild_id, msg.channel_name),
        )?;

        tx.execute(
            "INSERT INTO users (user_id, username, display_name, first_seen, last_seen)
             VALUES (?1, ?2, ?3, datetime(?4, 'unixepoch'), datetime(?4, 'unixepoch'))
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 display_name = excluded.display_name,
                 last_seen = excluded.last_seen",
            (msg.user_id, msg.username, msg.display_name, msg.timestamp),
        )?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO messages
                 (discord_id, user_id, guild_id, channel_id, content, timestamp, word_count)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime(?6, 'unixepoch'), ?7)",
            (
                msg.discord_id,
                msg.user_id,
                msg.guild_id,
                msg.channel_id,
                msg.content,
                msg.timestamp,
                word_count,
            ),
        )? > 0;

        if inserted {
            let message_id = tx.last_insert_rowid();
            tx.execute(
                &format!(
                    "INSERT INTO {shard}
                         (message_id, guild_id, channel_id, content, timestamp, word_count)
                     VALUES (?1, ?2, ?3, ?4, datetime(?5, 'unixepoch'), ?6)"
                ),
                (
                    message_id,
                    msg.guild_id,
                    msg.channel_id,
                    msg.content,
                    msg.timestamp,
                    word_count,
                ),
            )?;
            tx.execute(
                "UPDATE users SET total_messages = total_messages + 1 WHERE user_id = ?1",
                (msg.user_id,),
            )?;
            Self::update_thread(&tx, msg)?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Best-effort topic grouping: messages land in the channel's current
    /// thread unless the channel has been quiet past the gap, in which
    /// case a fresh thread row is opened.
    fn update_thread(tx: &rusqlite::Transaction<'_>, msg: &NewMessage<'_>) -> anyhow::Result<()> {
        let cutoff = msg.timestamp - THREAD_GAP_SECS;
        let open: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, participants FROM conversation_threads
                 WHERE channel_id = ?1 AND last_activity >= datetime(?2, 'unixepoch')
                 ORDER BY last_activity DESC, id DESC LIMIT 1",
                (msg.channel_id, cutoff),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match open {
            Some((thread_id, raw)) => {
                let mut participants: Vec<String> =
                    serde_json::from_str(&raw).unwrap_or_default();
                if !participants.iter().any(|p| p == msg.user_id) {
                    participants.push(msg.user_id.to_string());
                }
                tx.execute(
                    "UPDATE conversation_threads
                     SET participants = ?1,
                         message_count = message_count + 1,
                         last_activity = datetime(?2, 'unixepoch')
                     WHERE id = ?3",
                    (serde_json::to_string(&participants)?, msg.timestamp, thread_id),
                )?;
            }
            None => {
                let participants = serde_json::to_string(&[msg.user_id])?;
                tx.execute(
                    "INSERT INTO conversation_threads
                         (guild_id, channel_id, participants, start_time, last_activity, message_count)
                     VALUES (?1, ?2, ?3, datetime(?4, 'unixepoch'), datetime(?4, 'unixepoch'), 1)",
                    (msg.guild_id, msg.channel_id, participants, msg.timestamp),
                )?;
            }
        }
        Ok(())
    }

    /// Last `limit` messages in a channel, newest first. Timestamp ties
    /// fall back to row id so the order is stable.
    pub fn recent_messages(&self, channel_id: &str, limit: usize) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, u.display_name, m.content, m.timestamp, m.word_count
             FROM messages m
             JOIN users u ON m.user_id = u.user_id
             WHERE m.channel_id = ?1
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map((channel_id, limit), Self::map_stored_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Messages in `[start, end]` for a channel, chronological. When
    /// more than `limit` messages fall in the window the newest are
    /// kept, so the limit drops the oldest end.
    pub fn messages_in_timeframe(
        &self,
        channel_id: &str,
        start_unix: i64,
        end_unix: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, u.display_name, m.content, m.timestamp, m.word_count
             FROM messages m
             JOIN users u ON m.user_id = u.user_id
             WHERE m.channel_id = ?1
               AND m.timestamp >= datetime(?2, 'unixepoch')
               AND m.timestamp <= datetime(?3, 'unixepoch')
             ORDER BY m.timestamp DESC, m.id DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            (channel_id, start_unix, end_unix, limit),
            Self::map_stored_message,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.reverse();
        Ok(out)
    }

    fn map_stored_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
        Ok(StoredMessage {
            id: row.get(0)?,
            user_id: row.get(1)?,
            author_name: row.get(2)?,
            content: row.get(3)?,
            timestamp: row.get(4)?,
            word_count: row.get(5)?,
        })
    }

    /// Reads from the user's shard table. A user with no shard yet has
    /// no messages; that is an empty result, not an error. Returned
    /// chronological.
    pub fn user_messages(
        &self,
        user_id: &str,
        guild_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<ShardMessage>> {
        let table = schema::shard_table_name(user_id);
        let conn = self.conn.lock().unwrap();

        let exists: bool = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?1")?
            .exists([&table])?;
        if !exists {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT message_id, guild_id, channel_id, content, timestamp, word_count
             FROM {table}"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(gid) = guild_id {
            sql.push_str(" WHERE guild_id = ?1");
            params.push(Box::new(gid.to_string()));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        params.push(Box::new(limit));

        let mut stmt = conn.prepare(&sql)?;
        let params_slice: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(&params_slice[..], |row| {
            Ok(ShardMessage {
                message_id: row.get(0)?,
                guild_id: row.get(1)?,
                channel_id: row.get(2)?,
                content: row.get(3)?,
                timestamp: row.get(4)?,
                word_count: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.reverse();
        Ok(out)
    }

    /// Aggregate activity for a user, joined across the registry and the
    /// unified table. None when the user has never been seen.
    pub fn user_stats(&self, user_id: &str, guild_id: &str) -> anyhow::Result<Option<UserStats>> {
        let conn = self.conn.lock().unwrap();

        let base = conn
            .query_row(
                "SELECT username, display_name, total_messages, first_seen, last_seen
                 FROM users WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((username, display_name, total_messages, first_seen, last_seen)) = base else {
            return Ok(None);
        };

        let (guild_message_count, avg_word_count, first_message, last_message) = conn.query_row(
            "SELECT COUNT(*), AVG(word_count), MIN(timestamp), MAX(timestamp)
             FROM messages WHERE user_id = ?1 AND guild_id = ?2",
            (user_id, guild_id),
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )?;

        let table = schema::shard_table_name(user_id);
        let has_shard_table: bool = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?1")?
            .exists([&table])?;

        Ok(Some(UserStats {
            user_id: user_id.to_string(),
            username,
            display_name,
            total_messages,
            first_seen,
            last_seen,
            guild_message_count,
            avg_word_count,
            first_message,
            last_message,
            has_shard_table,
        }))
    }

    /// Users ordered by recency. With a guild id the per-guild message
    /// count is included.
    pub fn list_users(&self, guild_id: Option<&str>, limit: usize) -> anyhow::Result<Vec<UserListEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();

        if let Some(gid) = guild_id {
            let mut stmt = conn.prepare(
                "SELECT u.user_id, u.username, u.display_name, u.total_messages, u.last_seen,
                        COUNT(m.id)
                 FROM users u
                 LEFT JOIN messages m ON u.user_id = m.user_id AND m.guild_id = ?1
                 GROUP BY u.user_id
                 ORDER BY u.last_seen DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map((gid, limit), |row| {
                Ok(UserListEntry {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                    total_messages: row.get(3)?,
                    last_seen: row.get(4)?,
                    guild_messages: Some(row.get(5)?),
                })
            })?;
            for row in rows {
                out.push(row?);
            }
        } else {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, display_name, total_messages, last_seen
                 FROM users ORDER BY last_seen DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                Ok(UserListEntry {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                    total_messages: row.get(3)?,
                    last_seen: row.get(4)?,
                    guild_messages: None,
                })
            })?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }

    pub fn list_tables(&self) -> anyhow::Result<TableListing> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type='table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let (shards, core): (Vec<String>, Vec<String>) = names
            .into_iter()
            .partition(|n| n.starts_with(schema::SHARD_PREFIX));
        Ok(TableListing { core, shards })
    }

    /// Column listing for the core tables, for the operator-facing
    /// `/database schema` command.
    pub fn schema_info(&self) -> anyhow::Result<Vec<TableSchema>> {
        let listing = self.list_tables()?;
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        for name in listing.core {
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
            let columns: Vec<String> = stmt
                .query_map([&name], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            out.push(TableSchema { name, columns });
        }
        Ok(out)
    }

    // --- Summaries (append-only) ---

    pub fn save_summary(
        &self,
        guild_id: &str,
        channel_id: &str,
        summary: &str,
        message_count: usize,
        window_label: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO context_summaries (guild_id, channel_id, summary, message_count, window_label)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (guild_id, channel_id, summary, message_count, window_label),
        )?;
        Ok(())
    }

    pub fn latest_summary(&self, channel_id: &str) -> anyhow::Result<Option<SummaryRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, summary, message_count, window_label, created_at
                 FROM context_summaries WHERE channel_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                [channel_id],
                Self::map_summary,
            )
            .optional()?;
        Ok(record)
    }

    pub fn summaries_since(
        &self,
        guild_id: &str,
        channel_id: &str,
        days_back: i64,
    ) -> anyhow::Result<Vec<SummaryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, summary, message_count, window_label, created_at
             FROM context_summaries
             WHERE guild_id = ?1 AND channel_id = ?2
               AND created_at > datetime('now', ?3)
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(
            (guild_id, channel_id, format!("-{} days", days_back)),
            Self::map_summary,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count_summaries(&self, channel_id: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM context_summaries WHERE channel_id = ?1",
            [channel_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_messages_since(&self, channel_id: &str, hours: i64) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE channel_id = ?1 AND timestamp > datetime('now', ?2)",
            (channel_id, format!("-{} hours", hours)),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRecord> {
        Ok(SummaryRecord {
            id: row.get(0)?,
            summary: row.get(1)?,
            message_count: row.get(2)?,
            window_label: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            created_at: row.get(4)?,
        })
    }

    // --- User profiles ---

    /// Full-recompute overwrite; the UNIQUE(user_id, guild_id) constraint
    /// guarantees a single current row per pair.
    pub fn upsert_user_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_profiles
                 (user_id, guild_id, message_count, avg_word_count, active_hours, top_words, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id, guild_id) DO UPDATE SET
                 message_count = excluded.message_count,
                 avg_word_count = excluded.avg_word_count,
                 active_hours = excluded.active_hours,
                 top_words = excluded.top_words,
                 updated_at = CURRENT_TIMESTAMP",
            (
                &profile.user_id,
                &profile.guild_id,
                profile.message_count,
                profile.avg_word_count,
                serde_json::to_string(&profile.active_hours)?,
                serde_json::to_string(&profile.top_words)?,
            ),
        )?;
        Ok(())
    }

    pub fn get_user_profile(&self, user_id: &str, guild_id: &str) -> anyhow::Result<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT message_count, avg_word_count, active_hours, top_words
                 FROM user_profiles WHERE user_id = ?1 AND guild_id = ?2",
                (user_id, guild_id),
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((message_count, avg_word_count, hours_json, words_json)) = raw else {
            return Ok(None);
        };

        Ok(Some(UserProfile {
            user_id: user_id.to_string(),
            guild_id: guild_id.to_string(),
            message_count,
            avg_word_count,
            active_hours: hours_json
                .as_deref()
                .and_then(|j| serde_json::from_str(j).ok())
                .unwrap_or_default(),
            top_words: words_json
                .as_deref()
                .and_then(|j| serde_json::from_str(j).ok())
                .unwrap_or_default(),
        }))
    }

    pub fn count_user_profiles(&self, user_id: &str, guild_id: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM user_profiles WHERE user_id = ?1 AND guild_id = ?2",
            (user_id, guild_id),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- Retention ---

    /// Deletes messages older than `message_days` from the unified table
    /// and every shard table, plus summaries older than `summary_days`.
    /// Operator-triggered only; there is no background schedule.
    pub fn cleanup_old_data(
        &self,
        message_days: u32,
        summary_days: u32,
    ) -> anyhow::Result<CleanupReport> {
        let shards = self.list_tables()?.shards;
        let conn = self.conn.lock().unwrap();
        let mut report = CleanupReport::default();

        // Shard rows reference messages(id), so they go first
        let message_cutoff = format!("-{} days", message_days);
        for table in shards {
            report.shard_rows_deleted += conn.execute(
                &format!("DELETE FROM {table} WHERE timestamp < datetime('now', ?1)"),
                (&message_cutoff,),
            )?;
        }

        report.messages_deleted = conn.execute(
            "DELETE FROM messages WHERE timestamp < datetime('now', ?1)",
            (&message_cutoff,),
        )?;

        report.summaries_deleted = conn.execute(
            "DELETE FROM context_summaries WHERE created_at < datetime('now', ?1)",
            (format!("-{} days", summary_days),),
        )?;

        info!(
            "Database: Cleanup removed {} messages, {} shard rows, {} summaries",
            report.messages_deleted, report.shard_rows_deleted, report.summaries_deleted
        );
        Ok(report)
    }

    /// Runs a blocking database closure off the async executor.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    #[cfg(test)]
    fn raw_count(&self, sql: &str) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_db() -> Database {
        let config = Config::for_tests();
        let db = Database::new(&config).unwrap();
        db.execute_init().unwrap();
        db
    }

    fn ingest(db: &Database, discord_id: &str, channel: &str, user: &str, content: &str, ts: i64) -> bool {
        db.store_message(&NewMessage {
            discord_id,
            guild_id: "g1",
            guild_name: Some("Test Guild"),
            channel_id: channel,
            channel_name: Some("general"),
            user_id: user,
            username: &format!("{}_name", user),
            display_name: user,
            content,
            timestamp: ts,
        })
        .unwrap()
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = test_db();
        db.execute_init().unwrap();
        db.execute_init().unwrap();
    }

    #[test]
    fn test_ingest_creates_registry_rows_once() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "hello", 1_700_000_000);
        ingest(&db, "m2", "c1", "u1", "again", 1_700_000_100);

        assert_eq!(db.raw_count("SELECT COUNT(*) FROM guilds"), 1);
        assert_eq!(db.raw_count("SELECT COUNT(*) FROM channels"), 1);
        assert_eq!(db.raw_count("SELECT COUNT(*) FROM users"), 1);
        assert_eq!(db.raw_count("SELECT COUNT(*) FROM messages"), 2);
    }

    #[test]
    fn test_shard_stays_in_sync_with_unified_table() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "one", 1_700_000_000);
        ingest(&db, "m2", "c1", "u1", "two", 1_700_000_100);
        ingest(&db, "m3", "c2", "u2", "three", 1_700_000_200);
        // Duplicate discord_id must touch neither table
        assert!(!ingest(&db, "m2", "c1", "u1", "two again", 1_700_000_300));

        for user in ["u1", "u2"] {
            let unified = db.raw_count(&format!(
                "SELECT COUNT(*) FROM messages WHERE user_id = '{user}'"
            ));
            let shard = db.raw_count(&format!(
                "SELECT COUNT(*) FROM {}",
                schema::shard_table_name(user)
            ));
            assert_eq!(unified, shard, "shard out of sync for {user}");
        }
    }

    #[test]
    fn test_duplicate_message_does_not_bump_totals() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "hello", 1_700_000_000);
        ingest(&db, "m1", "c1", "u1", "hello", 1_700_000_000);

        let total = db.raw_count("SELECT total_messages FROM users WHERE user_id = 'u1'");
        assert_eq!(total, 1);
    }

    #[test]
    fn test_recent_messages_newest_first_and_bounded() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "first", 1_700_000_000);
        ingest(&db, "m2", "c1", "u1", "second", 1_700_000_100);
        ingest(&db, "m3", "c1", "u1", "third", 1_700_000_200);

        let recent = db.recent_messages("c1", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "third");
        assert_eq!(recent[1].content, "second");

        // Idempotent absent new ingestion
        let again = db.recent_messages("c1", 2).unwrap();
        assert_eq!(again[0].content, "third");
        assert_eq!(again[1].content, "second");
    }

    #[test]
    fn test_timestamp_ties_break_by_insertion_order() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "a", 1_700_000_000);
        ingest(&db, "m2", "c1", "u1", "b", 1_700_000_000);
        ingest(&db, "m3", "c1", "u1", "c", 1_700_000_000);

        let recent = db.recent_messages("c1", 10).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["c", "b", "a"]);

        let chrono = db
            .messages_in_timeframe("c1", 1_600_000_000, 1_800_000_000, 10)
            .unwrap();
        let contents: Vec<_> = chrono.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_messages_in_timeframe_bounds() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "early", 1_700_000_000);
        ingest(&db, "m2", "c1", "u1", "inside", 1_700_003_600);
        ingest(&db, "m3", "c1", "u1", "late", 1_700_010_000);

        let window = db
            .messages_in_timeframe("c1", 1_700_003_000, 1_700_009_000, 10)
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].content, "inside");
    }

    #[test]
    fn test_user_messages_without_shard_is_empty() {
        let db = test_db();
        let messages = db.user_messages("never_seen", None, 10).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_user_messages_guild_filter() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "in g1", 1_700_000_000);
        db.store_message(&NewMessage {
            discord_id: "m2",
            guild_id: "g2",
            guild_name: None,
            channel_id: "c9",
            channel_name: None,
            user_id: "u1",
            username: "u1_name",
            display_name: "u1",
            content: "in g2",
            timestamp: 1_700_000_100,
        })
        .unwrap();

        let all = db.user_messages("u1", None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "in g1"); // chronological

        let g1_only = db.user_messages("u1", Some("g1"), 10).unwrap();
        assert_eq!(g1_only.len(), 1);
        assert_eq!(g1_only[0].content, "in g1");
    }

    #[test]
    fn test_user_stats() {
        let db = test_db();
        assert!(db.user_stats("ghost", "g1").unwrap().is_none());

        ingest(&db, "m1", "c1", "u1", "two words", 1_700_000_000);
        ingest(&db, "m2", "c1", "u1", "four words right here", 1_700_000_100);

        let stats = db.user_stats("u1", "g1").unwrap().unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.guild_message_count, 2);
        assert!((stats.avg_word_count - 3.0).abs() < f64::EPSILON);
        assert!(stats.has_shard_table);
        assert!(stats.first_message.is_some());
    }

    #[test]
    fn test_list_users_with_guild_counts() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "hi", 1_700_000_000);
        ingest(&db, "m2", "c1", "u2", "hey", 1_700_000_100);
        ingest(&db, "m3", "c1", "u2", "again", 1_700_000_200);

        let users = db.list_users(Some("g1"), 10).unwrap();
        assert_eq!(users.len(), 2);
        let u2 = users.iter().find(|u| u.user_id == "u2").unwrap();
        assert_eq!(u2.guild_messages, Some(2));
    }

    #[test]
    fn test_list_tables_splits_core_and_shards() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "hi", 1_700_000_000);

        let listing = db.list_tables().unwrap();
        assert!(listing.core.iter().any(|t| t == "messages"));
        assert!(listing.core.iter().any(|t| t == "context_summaries"));
        assert_eq!(listing.shards, vec!["user_messages_u1".to_string()]);
    }

    #[test]
    fn test_schema_info_lists_columns() {
        let db = test_db();
        let info = db.schema_info().unwrap();
        let messages = info.iter().find(|t| t.name == "messages").unwrap();
        assert!(messages.columns.iter().any(|c| c == "discord_id"));
        assert!(messages.columns.iter().any(|c| c == "word_count"));
    }

    #[test]
    fn test_summaries_append_only() {
        let db = test_db();
        // Registers g1/c1 so the summaries have parent rows
        ingest(&db, "m1", "c1", "u1", "hello", 1_700_000_000);
        db.save_summary("g1", "c1", "first summary", 10, "last 2 days")
            .unwrap();
        db.save_summary("g1", "c1", "second summary", 20, "last 6 hours")
            .unwrap();

        assert_eq!(db.count_summaries("c1").unwrap(), 2);
        let latest = db.latest_summary("c1").unwrap().unwrap();
        assert_eq!(latest.summary, "second summary");
        assert_eq!(latest.message_count, 20);

        let recent = db.summaries_since("g1", "c1", 7).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].summary, "first summary");
    }

    #[test]
    fn test_profile_upsert_keeps_single_row() {
        let db = test_db();
        // Registers u1/g1 so the profile has parent rows
        ingest(&db, "m1", "c1", "u1", "hello", 1_700_000_000);
        let profile = UserProfile {
            user_id: "u1".into(),
            guild_id: "g1".into(),
            message_count: 5,
            avg_word_count: 4.2,
            active_hours: vec![0; 24],
            top_words: vec![("rust".into(), 3)],
        };
        db.upsert_user_profile(&profile).unwrap();
        db.upsert_user_profile(&profile).unwrap();

        assert_eq!(db.count_user_profiles("u1", "g1").unwrap(), 1);
        let loaded = db.get_user_profile("u1", "g1").unwrap().unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_cleanup_prunes_unified_and_shard_tables() {
        let db = test_db();
        // Bypass store_message to control the stored datetimes directly
        {
            let conn = db.conn.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO guilds (guild_id) VALUES ('g1');
                 INSERT INTO channels (channel_id, guild_id) VALUES ('c1', 'g1');
                 INSERT INTO users (user_id) VALUES ('u1');",
            )
            .unwrap();
            conn.execute(&schema::shard_table_ddl("user_messages_u1"), [])
                .unwrap();
            for (id, offset) in [("old", "-60 days"), ("new", "-1 hours")] {
                conn.execute(
                    &format!(
                        "INSERT INTO messages (discord_id, user_id, guild_id, channel_id, content, timestamp, word_count)
                         VALUES ('{id}', 'u1', 'g1', 'c1', '{id} msg', datetime('now', '{offset}'), 2)"
                    ),
                    [],
                )
                .unwrap();
                let message_id = conn.last_insert_rowid();
                conn.execute(
                    &format!(
                        "INSERT INTO user_messages_u1 (message_id, guild_id, channel_id, content, timestamp, word_count)
                         VALUES ({message_id}, 'g1', 'c1', '{id} msg', datetime('now', '{offset}'), 2)"
                    ),
                    [],
                )
                .unwrap();
            }
            conn.execute(
                "INSERT INTO context_summaries (guild_id, channel_id, summary, created_at)
                 VALUES ('g1', 'c1', 'ancient', datetime('now', '-120 days'))",
                [],
            )
            .unwrap();
        }

        let report = db.cleanup_old_data(30, 90).unwrap();
        assert_eq!(report.messages_deleted, 1);
        assert_eq!(report.shard_rows_deleted, 1);
        assert_eq!(report.summaries_deleted, 1);
        assert_eq!(db.raw_count("SELECT COUNT(*) FROM messages"), 1);
        assert_eq!(db.raw_count("SELECT COUNT(*) FROM user_messages_u1"), 1);
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let db = test_db();
        let conn = db.conn.lock().unwrap();
        let orphan = conn.execute(
            "INSERT INTO context_summaries (guild_id, channel_id, summary)
             VALUES ('no_such_guild', 'no_such_channel', 'x')",
            [],
        );
        assert!(orphan.is_err());
    }

    #[test]
    fn test_timeframe_limit_keeps_most_recent() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "oldest", 1_700_000_000);
        ingest(&db, "m2", "c1", "u1", "middle", 1_700_000_100);
        ingest(&db, "m3", "c1", "u1", "newest", 1_700_000_200);

        let messages = db
            .messages_in_timeframe("c1", 1_699_999_000, 1_700_001_000, 2)
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "middle");
        assert_eq!(messages[1].content, "newest");
    }

    #[test]
    fn test_thread_grouping_by_quiet_gap() {
        let db = test_db();
        ingest(&db, "m1", "c1", "u1", "hello", 1_700_000_000);
        ingest(&db, "m2", "c1", "u2", "hi there", 1_700_000_060);
        // Quiet for over the gap, so a new thread opens
        ingest(&db, "m3", "c1", "u1", "new topic", 1_700_000_060 + THREAD_GAP_SECS + 60);

        assert_eq!(db.raw_count("SELECT COUNT(*) FROM conversation_threads"), 2);
        let first_participants: String = {
            let conn = db.conn.lock().unwrap();
            conn.query_row(
                "SELECT participants FROM conversation_threads ORDER BY id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap()
        };
        let participants: Vec<String> = serde_json::from_str(&first_participants).unwrap();
        assert_eq!(participants, vec!["u1", "u2"]);
    }
}
