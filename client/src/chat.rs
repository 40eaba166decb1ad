//! Chat boundary: the coach conversation on top of the chat transcript.
//!
//! The completion service itself is an opaque collaborator; this module
//! only sequences a user turn, the reply and the transcript save.

use async_trait::async_trait;
use fitsync_engine::{ChatMessage, Sender};

use crate::error::ChatError;
use crate::gateway::MutationGateway;

/// Request/response chat completion.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Reply to the transcript, whose last message is the newest user turn.
    async fn reply(&self, history: &[ChatMessage]) -> Result<String, ChatError>;
}

/// One user turn against the completion service.
pub struct ChatExchange;

impl ChatExchange {
    /// Send `text`, persist the transcript and return the bot reply.
    ///
    /// When the completion fails the user message is still saved and the
    /// completion error is returned.
    pub async fn send(
        gateway: &MutationGateway,
        completion: &dyn ChatCompletion,
        text: &str,
    ) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut transcript = gateway.chat_log();
        transcript.push(ChatMessage::new(new_message_id(), text, Sender::User));

        match completion.reply(&transcript).await {
            Ok(reply) => {
                let bot = ChatMessage::new(new_message_id(), reply, Sender::Bot);
                transcript.push(bot.clone());
                gateway.save_chat_log(transcript).await?;
                Ok(bot)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Chat completion failed");
                gateway.save_chat_log(transcript).await?;
                Err(e)
            }
        }
    }
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
