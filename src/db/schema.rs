//! Core DDL and per-user shard table naming.

/// Core relational schema. Executed as a batch; every statement is
/// idempotent so init can run on every startup.
pub const CORE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS guilds (
        guild_id TEXT PRIMARY KEY,
        guild_name TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        last_activity DATETIME DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS channels (
        channel_id TEXT PRIMARY KEY,
        guild_id TEXT,
        channel_name TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (guild_id) REFERENCES guilds(guild_id)
    );

    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        username TEXT,
        display_name TEXT,
        first_seen DATETIME DEFAULT CURRENT_TIMESTAMP,
        last_seen DATETIME DEFAULT CURRENT_TIMESTAMP,
        total_messages INTEGER DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        discord_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp DATETIME NOT NULL,
        word_count INTEGER,
        FOREIGN KEY (user_id) REFERENCES users(user_id),
        FOREIGN KEY (guild_id) REFERENCES guilds(guild_id),
        FOREIGN KEY (channel_id) REFERENCES channels(channel_id)
    );

    CREATE TABLE IF NOT EXISTS user_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        message_count INTEGER DEFAULT 0,
        avg_word_count REAL DEFAULT 0,
        active_hours TEXT,
        top_words TEXT,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (user_id) REFERENCES users(user_id),
        FOREIGN KEY (guild_id) REFERENCES guilds(guild_id),
        UNIQUE(user_id, guild_id)
    );

    CREATE TABLE IF NOT EXISTS context_summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        summary TEXT NOT NULL,
        message_count INTEGER,
        window_label TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (guild_id) REFERENCES guilds(guild_id),
        FOREIGN KEY (channel_id) REFERENCES channels(channel_id)
    );

    CREATE TABLE IF NOT EXISTS conversation_threads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT,
        channel_id TEXT,
        thread_name TEXT,
        participants TEXT,
        start_time DATETIME,
        last_activity DATETIME,
        message_count INTEGER DEFAULT 0,
        FOREIGN KEY (guild_id) REFERENCES guilds(guild_id),
        FOREIGN KEY (channel_id) REFERENCES channels(channel_id)
    );

    CREATE INDEX IF NOT EXISTS idx_messages_channel_time ON messages (channel_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_user_time ON messages (user_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_guild_time ON messages (guild_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_users_last_seen ON users (last_seen);
";

pub const SHARD_PREFIX: &str = "user_messages_";

/// Table name for a user's shard. User ids are Discord snowflakes in
/// practice, but anything outside [A-Za-z0-9] maps to an underscore so
/// the name is always a valid identifier.
pub fn shard_table_name(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}{}", SHARD_PREFIX, safe)
}

/// DDL for a single user shard table. The table name must come from
/// `shard_table_name`, never from raw input.
pub fn shard_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER,
            guild_id TEXT,
            channel_id TEXT,
            content TEXT,
            timestamp DATETIME,
            word_count INTEGER,
            FOREIGN KEY (message_id) REFERENCES messages(id)
        )"
    )
}
