pub mod analyze;
pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod llm;
pub mod summarize;
pub mod system_prompt;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub llm: std::sync::Arc<llm::LlmClient>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
