use crate::store::{ConversationStore, StoreError, StoredConversation};
use crate::thread::{Resolution, ThreadMessage};
use crate::utils::strip_directives;
use std::sync::Arc;
use tracing::info;

pub const GREETING_PROMPT: &str =
    "[Important] A new conversation has just started. Greet them naturally, in character.";

const LOG_HEADER: &str = "[Conversation log]";
const REPLY_INSTRUCTION: &str = "[Important] Reply to the last post in the conversation above. \
                                 Respond naturally, in character.";

pub struct TranscriptBuilder {
    store: Arc<ConversationStore>,
}

impl TranscriptBuilder {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self { store }
    }

    /// Persisted history for a continued conversation; nothing for a new one.
    pub async fn history(
        &self,
        resolution: Resolution,
    ) -> Result<Option<StoredConversation>, StoreError> {
        match resolution {
            Resolution::Existing(id) => self.store.load_conversation(id).await,
            Resolution::New(_) => Ok(None),
        }
    }

    pub fn build(
        &self,
        history: Option<&StoredConversation>,
        thread: &[ThreadMessage],
        directive: Option<&str>,
    ) -> String {
        let lines = transcript_lines(history, thread, directive);

        if lines.is_empty() {
            info!("Empty conversation - sending greeting prompt");
            return GREETING_PROMPT.to_string();
        }

        info!("Built conversation prompt with {} messages", lines.len());
        format!(
            "{}\n{}\n\n{}",
            LOG_HEADER,
            lines.join("\n"),
            REPLY_INSTRUCTION
        )
    }
}

/// `author: content` lines, stored history first, then thread posts not yet stored.
///
/// Stored posts always lose their `/* ... */` spans. New posts lose them only
/// when they carry the active directive.
pub fn transcript_lines(
    history: Option<&StoredConversation>,
    thread: &[ThreadMessage],
    directive: Option<&str>,
) -> Vec<String> {
    let mut lines = Vec::new();
    let known = history.map(|h| h.known_status_ids()).unwrap_or_default();

    for message in history.map(|h| h.messages.as_slice()).unwrap_or_default() {
        let content = strip_directives(&message.content);
        if !content.is_empty() {
            lines.push(format!("{}: {}", message.author, content));
        }
    }

    for message in thread {
        if known.contains(message.status_id.as_str()) {
            continue;
        }
        let content = match directive {
            Some(d) if !d.is_empty() && message.content.contains(d) => {
                strip_directives(&message.content)
            }
            _ => message.content.trim().to_string(),
        };
        if !content.is_empty() {
            lines.push(format!("{}: {}", message.author, content));
        }
    }

    lines
}
