use crate::snowflake::{SnowflakeError, SnowflakeGenerator};
use crate::store::{ConversationId, ConversationStore, NewMessage, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// One post of a freshly fetched thread, HTML already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub status_id: String,
    pub author: String,
    pub content: String,
    pub url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ThreadMessage {
    pub fn to_new_message(&self, is_self_authored: bool) -> NewMessage {
        NewMessage {
            status_id: self.status_id.clone(),
            author: self.author.clone(),
            content: self.content.clone(),
            url: self.url.clone(),
            is_self_authored,
            observed_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Existing(ConversationId),
    New(ConversationId),
}

impl Resolution {
    pub fn id(self) -> ConversationId {
        match self {
            Resolution::Existing(id) | Resolution::New(id) => id,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Resolution::New(_))
    }
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Id(#[from] SnowflakeError),
}

/// Maps a fetched thread onto a stored conversation, allocating a new id when
/// none of its posts are known.
///
/// Lookup and allocation are two steps; callers handle one thread at a time.
pub struct ThreadMatcher {
    store: Arc<ConversationStore>,
    ids: Arc<SnowflakeGenerator>,
}

impl ThreadMatcher {
    pub fn new(store: Arc<ConversationStore>, ids: Arc<SnowflakeGenerator>) -> Self {
        Self { store, ids }
    }

    pub async fn resolve(&self, thread: &[ThreadMessage]) -> Result<Resolution, MatchError> {
        let status_ids: Vec<String> = thread.iter().map(|m| m.status_id.clone()).collect();

        if let Some(id) = self
            .store
            .find_conversation_id_by_any_status(&status_ids)
            .await?
        {
            info!("Found existing conversation ID: {}", id);
            return Ok(Resolution::Existing(id));
        }

        let id = self.ids.generate()?;
        info!("Generated new conversation ID: {}", id);
        Ok(Resolution::New(id))
    }
}
