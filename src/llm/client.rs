use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{CompletionBackend, LlmError};
use crate::config::Config;

pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout_secs: u64,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
        if let Some(base_url) = &config.openai_base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.ai_model.clone(),
            timeout_secs: config.llm_timeout_secs,
        }
    }

    async fn chat(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let chat = self.client.chat();
        let call = chat.create(request);
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| LlmError::Timeout(self.timeout_secs))?
            .map_err(classify_error)?;

        debug!("LLM: Completion received ({} choices)", response.choices.len());
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::Malformed("response contained no text".to_string()))
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| LlmError::Malformed(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| LlmError::Malformed(e.to_string()))?
                .into(),
        ];
        self.chat(messages).await
    }
}

fn classify_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                LlmError::Network(format!("request timed out: {e}"))
            } else {
                LlmError::Network(e.to_string())
            }
        }
        OpenAIError::JSONDeserialize(e) => LlmError::Malformed(e.to_string()),
        OpenAIError::ApiError(api) => {
            let label = format!(
                "{} {}",
                api.r#type.clone().unwrap_or_default(),
                api.message
            )
            .to_lowercase();
            if label.contains("rate limit") || label.contains("rate_limit") {
                LlmError::RateLimit(api.message)
            } else if label.contains("auth")
                || label.contains("api key")
                || label.contains("api_key")
                || label.contains("permission")
            {
                LlmError::Auth(api.message)
            } else {
                LlmError::Api(api.message)
            }
        }
        other => LlmError::Api(other.to_string()),
    }
}
