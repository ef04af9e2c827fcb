use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub ai_model: String,
    pub database_url: String,
    pub status_message: String,
    // Summarization settings
    pub summary_max_messages: usize,
    pub llm_timeout_secs: u64,
    // Analysis settings
    pub analysis_message_limit: usize,
    // Chat settings
    pub chat_context_limit: usize,
    // Memory status/context windows
    pub context_hours: i64,
    pub context_days_back: i64,
    // Retention settings (applied by /memory cleanup)
    pub retention_days: u32,
    pub summary_retention_days: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            openai_api_key: env::var("OPENAI_API_KEY")
                .or_else(|_| env::var("GROQ_API_KEY"))
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY or GROQ_API_KEY must be set"))?,
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            ai_model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/rumi_memory.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Remembering everything".to_string()),
            summary_max_messages: env::var("SUMMARY_MAX_MESSAGES")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .unwrap_or(200),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            analysis_message_limit: env::var("ANALYSIS_MESSAGE_LIMIT")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .unwrap_or(200),
            chat_context_limit: env::var("CHAT_CONTEXT_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            context_hours: env::var("CONTEXT_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            context_days_back: env::var("CONTEXT_DAYS_BACK")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap_or(7),
            retention_days: env::var("RETENTION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            summary_retention_days: env::var("SUMMARY_RETENTION_DAYS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .unwrap_or(90),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            discord_token: "test".to_string(),
            openai_api_key: "test".to_string(),
            openai_base_url: None,
            ai_model: "test-model".to_string(),
            database_url: ":memory:".to_string(),
            status_message: "test".to_string(),
            summary_max_messages: 200,
            llm_timeout_secs: 30,
            analysis_message_limit: 200,
            chat_context_limit: 100,
            context_hours: 24,
            context_days_back: 7,
            retention_days: 30,
            summary_retention_days: 90,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("openai_api_key", &"[REDACTED]")
            .field("openai_base_url", &self.openai_base_url)
            .field("ai_model", &self.ai_model)
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("summary_max_messages", &self.summary_max_messages)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("analysis_message_limit", &self.analysis_message_limit)
            .field("chat_context_limit", &self.chat_context_limit)
            .field("context_hours", &self.context_hours)
            .field("context_days_back", &self.context_days_back)
            .field("retention_days", &self.retention_days)
            .field("summary_retention_days", &self.summary_retention_days)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Test missing vars
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("GROQ_API_KEY");
        let result = Config::build();
        assert!(result.is_err(), "Should fail when required vars are missing");

        // 2. Test defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        env::set_var("OPENAI_API_KEY", "secret_api_key");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.ai_model, "gpt-4o-mini");
        assert_eq!(config.summary_max_messages, 200);
        assert_eq!(config.retention_days, 30);

        // 3. Test debug redaction
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("secret_api_key"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("OPENAI_API_KEY");
    }
}
