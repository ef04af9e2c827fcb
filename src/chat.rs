//! Conversational replies seeded with stored channel context and the
//! asker's communication profile.

use std::sync::Arc;
use tracing::info;

use crate::db::{Database, StoredMessage, UserProfile};
use crate::llm::CompletionBackend;
use crate::system_prompt;

pub struct ChatResponder {
    db: Database,
    backend: Arc<dyn CompletionBackend>,
    context_limit: usize,
}

impl ChatResponder {
    pub fn new(db: Database, backend: Arc<dyn CompletionBackend>, context_limit: usize) -> Self {
        Self {
            db,
            backend,
            context_limit,
        }
    }

    /// Answers a prompt in a channel. Recent messages (clamped to
    /// `context_limit`) and the asker's stored profile, when one exists,
    /// are folded into the completion. Nothing is persisted; the reply
    /// itself comes back through the gateway like any other message.
    pub async fn respond(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        message: &str,
        context_messages: usize,
    ) -> anyhow::Result<String> {
        let limit = context_messages.min(self.context_limit);
        let mut recent = self.db.recent_messages(channel_id, limit)?;
        recent.reverse();

        let profile = self.db.get_user_profile(user_id, guild_id)?;
        let prompt = build_prompt(message, profile.as_ref(), &recent);

        let text = self
            .backend
            .complete(&chat_system_prompt(), &prompt)
            .await?;
        info!(
            "Chat: replied in channel {} with {} context messages",
            channel_id,
            recent.len()
        );
        Ok(text)
    }
}

fn chat_system_prompt() -> String {
    format!(
        "{}\n\n\
         You have context about this user and the ongoing conversation. Respond \
         naturally and appropriately, showing awareness of the user's communication \
         style, recent conversation topics, and the current discussion context. \
         Keep responses concise unless the situation calls for elaboration.",
        system_prompt::RUMI_PERSONALITY
    )
}

fn build_prompt(
    message: &str,
    profile: Option<&UserProfile>,
    recent: &[StoredMessage],
) -> String {
    let mut out = String::new();

    if let Some(profile) = profile {
        let topics = profile
            .top_words
            .iter()
            .map(|(word, _)| word.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "USER CONTEXT:\n\
             - Messages on record: {}\n\
             - Average message length: {:.1} words\n\
             - Common topics: {}\n\n",
            profile.message_count,
            profile.avg_word_count,
            if topics.is_empty() { "Unknown" } else { topics.as_str() }
        ));
    }

    out.push_str("RECENT CONVERSATION CONTEXT:\n");
    if recent.is_empty() {
        out.push_str("No recent context available\n");
    } else {
        for msg in recent {
            out.push_str(&format!("{}: {}\n", msg.author_name, msg.content));
        }
    }

    out.push_str(&format!(
        "\nCURRENT MESSAGE: {message}\n\n\
         Respond as Rumi, showing contextual awareness and continuity."
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::NewMessage;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubBackend {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn returning(text: &str) -> Arc<Self> {
            Arc::new(Self {
                response: text.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionBackend for StubBackend {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    fn test_db() -> Database {
        let db = Database::new(&Config::for_tests()).unwrap();
        db.execute_init().unwrap();
        db
    }

    fn ingest(db: &Database, discord_id: &str, user: &str, content: &str, ts: i64) {
        db.store_message(&NewMessage {
            discord_id,
            guild_id: "g1",
            guild_name: None,
            channel_id: "c1",
            channel_name: None,
            user_id: user,
            username: user,
            display_name: user,
            content,
            timestamp: ts,
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_prompt_carries_transcript_and_profile() {
        let db = test_db();
        ingest(&db, "m1", "alice", "compilers are great", 1_700_000_000);
        ingest(&db, "m2", "bob", "agreed honestly", 1_700_000_100);
        db.upsert_user_profile(&UserProfile {
            user_id: "alice".into(),
            guild_id: "g1".into(),
            message_count: 12,
            avg_word_count: 5.5,
            active_hours: vec![0; 24],
            top_words: vec![("compilers".into(), 4)],
        })
        .unwrap();

        let backend = StubBackend::returning("hello alice");
        let responder = ChatResponder::new(db.clone(), backend.clone(), 100);

        let reply = responder
            .respond("g1", "c1", "alice", "what did I miss?", 20)
            .await
            .unwrap();

        assert_eq!(reply, "hello alice");
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("alice: compilers are great"));
        assert!(prompts[0].contains("bob: agreed honestly"));
        assert!(prompts[0].contains("Common topics: compilers"));
        assert!(prompts[0].contains("CURRENT MESSAGE: what did I miss?"));
    }

    #[tokio::test]
    async fn test_empty_channel_and_unseen_user() {
        let db = test_db();
        let backend = StubBackend::returning("hi");
        let responder = ChatResponder::new(db, backend.clone(), 100);

        responder
            .respond("g1", "c1", "ghost", "anyone here?", 20)
            .await
            .unwrap();

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].contains("No recent context available"));
        assert!(!prompts[0].contains("USER CONTEXT"));
    }

    #[tokio::test]
    async fn test_context_clamped_to_limit() {
        let db = test_db();
        ingest(&db, "m1", "alice", "first", 1_700_000_000);
        ingest(&db, "m2", "alice", "second", 1_700_000_100);
        ingest(&db, "m3", "alice", "third", 1_700_000_200);

        let backend = StubBackend::returning("ok");
        let responder = ChatResponder::new(db, backend.clone(), 2);

        responder.respond("g1", "c1", "alice", "hm", 50).await.unwrap();

        let prompts = backend.prompts.lock().unwrap();
        assert!(!prompts[0].contains("alice: first"));
        assert!(prompts[0].contains("alice: second"));
        assert!(prompts[0].contains("alice: third"));
    }
}
