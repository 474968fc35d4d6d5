use crate::entity::{conversations, messages};
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::*;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const DB_FILE: &str = "conversations.db";

pub type ConversationId = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error, transaction rolled back: {0}")]
    Database(#[from] DbErr),
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Conversation {0} does not exist")]
    UnknownConversation(ConversationId),
}

/// Conversation row written after each exchange.
#[derive(Debug, Clone)]
pub struct ConversationUpdate {
    pub id: ConversationId,
    pub custom_directive: Option<String>,
    pub active_prompt: Option<String>,
    pub latest_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub status_id: String,
    pub author: String,
    pub content: String,
    pub url: Option<String>,
    pub is_self_authored: bool,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub status_id: String,
    pub author: String,
    pub content: String,
    pub url: Option<String>,
    pub is_self_authored: bool,
    pub observed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredConversation {
    pub id: ConversationId,
    pub custom_directive: Option<String>,
    pub active_prompt: Option<String>,
    pub latest_response: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<StoredMessage>,
}

impl StoredConversation {
    pub fn known_status_ids(&self) -> HashSet<&str> {
        self.messages.iter().map(|m| m.status_id.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub custom_directive: Option<String>,
    pub message_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// SQLite-backed record of conversations and their messages.
///
/// Every public operation runs in its own transaction on a blocking thread.
pub struct ConversationStore {
    db_url: String,
}

impl ConversationStore {
    pub async fn open(data_dir: &Path) -> Result<Arc<Self>, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE);
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        tokio::task::spawn_blocking({
            let db_url = db_url.clone();
            move || -> Result<(), DbErr> {
                let db = Database::connect(&db_url)?;

                db.get_schema_builder()
                    .register(conversations::Entity)
                    .register(messages::Entity)
                    .apply(&db)?;

                db.execute_unprepared(
                    "CREATE INDEX IF NOT EXISTS idx_messages_conversation \
                     ON messages(conversation_id)",
                )?;

                Ok(())
            }
        })
        .await??;

        info!("ConversationStore ready ({})", db_path.display());
        Ok(Arc::new(Self { db_url }))
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DatabaseConnection) -> Result<T, DbErr> + Send + 'static,
    {
        let db_url = self.db_url.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<T, DbErr> {
            let db = Database::connect(&db_url)?;
            f(&db)
        })
        .await??;
        Ok(result)
    }

    pub async fn upsert_conversation(&self, update: ConversationUpdate) -> Result<(), StoreError> {
        self.run(move |db| {
            let txn = db.begin()?;
            upsert_in(&txn, &update, &now_timestamp())?;
            txn.commit()
        })
        .await
    }

    /// Messages whose `status_id` is already stored anywhere are skipped, never overwritten.
    ///
    /// The conversation must already exist.
    pub async fn insert_messages_ignoring_duplicates(
        &self,
        conversation_id: ConversationId,
        messages: Vec<NewMessage>,
    ) -> Result<InsertOutcome, StoreError> {
        self.run(move |db| {
            let txn = db.begin()?;
            if conversations::Entity::find_by_id(conversation_id)
                .one(&txn)?
                .is_none()
            {
                return Ok(None);
            }
            let outcome = insert_in(&txn, conversation_id, &messages)?;
            txn.commit()?;
            Ok(Some(outcome))
        })
        .await?
        .ok_or(StoreError::UnknownConversation(conversation_id))
    }

    /// Upsert plus message insert as a single transaction.
    pub async fn save_exchange(
        &self,
        update: ConversationUpdate,
        messages: Vec<NewMessage>,
    ) -> Result<InsertOutcome, StoreError> {
        let conversation_id = update.id;
        let outcome = self
            .run(move |db| {
                let txn = db.begin()?;
                upsert_in(&txn, &update, &now_timestamp())?;
                let outcome = insert_in(&txn, update.id, &messages)?;
                txn.commit()?;
                Ok(outcome)
            })
            .await?;

        info!(
            "Saved conversation {} ({} new messages, {} already stored)",
            conversation_id, outcome.inserted, outcome.skipped
        );
        Ok(outcome)
    }

    /// Conversation owning any of `status_ids`.
    ///
    /// Should the ids span several conversations, the oldest one (lowest id) wins.
    pub async fn find_conversation_id_by_any_status(
        &self,
        status_ids: &[String],
    ) -> Result<Option<ConversationId>, StoreError> {
        if status_ids.is_empty() {
            return Ok(None);
        }
        let status_ids = status_ids.to_vec();

        let matches = self
            .run(move |db| {
                messages::Entity::find()
                    .select_only()
                    .column(messages::Column::ConversationId)
                    .distinct()
                    .filter(messages::Column::StatusId.is_in(status_ids))
                    .order_by_asc(messages::Column::ConversationId)
                    .into_tuple::<i64>()
                    .all(db)
            })
            .await?;

        if matches.len() > 1 {
            warn!(
                "Thread spans {} stored conversations {:?}, using {}",
                matches.len(),
                matches,
                matches[0]
            );
        }
        Ok(matches.first().copied())
    }

    pub async fn load_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<StoredConversation>, StoreError> {
        self.run(move |db| {
            let txn = db.begin()?;
            let Some(row) = conversations::Entity::find_by_id(id).one(&txn)? else {
                return Ok(None);
            };
            let messages = ordered_messages(&txn, id)?;
            txn.commit()?;

            Ok(Some(StoredConversation {
                id: row.id,
                custom_directive: row.custom_directive,
                active_prompt: row.active_prompt,
                latest_response: row.latest_response,
                created_at: row.created_at,
                updated_at: row.updated_at,
                messages,
            }))
        })
        .await
    }

    pub async fn conversation_messages(
        &self,
        id: ConversationId,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.run(move |db| ordered_messages(db, id)).await
    }

    /// Most recently updated first.
    pub async fn list_conversations(
        &self,
        limit: u64,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        self.run(move |db| {
            let txn = db.begin()?;
            let rows = conversations::Entity::find()
                .order_by_desc(conversations::Column::UpdatedAt)
                .order_by_desc(conversations::Column::Id)
                .limit(limit)
                .all(&txn)?;

            let mut summaries = Vec::with_capacity(rows.len());
            for row in rows {
                let message_count = messages::Entity::find()
                    .filter(messages::Column::ConversationId.eq(row.id))
                    .count(&txn)?;
                summaries.push(ConversationSummary {
                    id: row.id,
                    custom_directive: row.custom_directive,
                    message_count,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                });
            }
            txn.commit()?;
            Ok(summaries)
        })
        .await
    }

    /// Returns `false` when the conversation does not exist.
    pub async fn update_custom_directive(
        &self,
        id: ConversationId,
        directive: &str,
    ) -> Result<bool, StoreError> {
        let directive = directive.to_string();

        let updated = self
            .run(move |db| {
                let txn = db.begin()?;
                let Some(row) = conversations::Entity::find_by_id(id).one(&txn)? else {
                    return Ok(false);
                };
                let updated_at = later(&row.updated_at, now_timestamp());
                let mut record: conversations::ActiveModel = row.into();
                record.custom_directive = Set(Some(directive));
                record.updated_at = Set(updated_at);
                record.update(&txn)?;
                txn.commit()?;
                Ok(true)
            })
            .await?;

        if updated {
            info!("Updated custom directive for conversation {}", id);
        }
        Ok(updated)
    }
}

fn upsert_in<C: ConnectionTrait>(
    db: &C,
    update: &ConversationUpdate,
    now: &str,
) -> Result<(), DbErr> {
    let directive = update
        .custom_directive
        .as_deref()
        .filter(|d| !d.is_empty());

    match conversations::Entity::find_by_id(update.id).one(db)? {
        Some(row) => {
            let updated_at = later(&row.updated_at, now.to_string());
            let mut record: conversations::ActiveModel = row.into();
            record.latest_response = Set(Some(update.latest_response.clone()));
            record.updated_at = Set(updated_at);
            if let Some(directive) = directive {
                record.custom_directive = Set(Some(directive.to_string()));
                record.active_prompt = Set(update.active_prompt.clone());
            }
            record.update(db)?;
        }
        None => {
            let record = conversations::ActiveModel {
                id: Set(update.id),
                custom_directive: Set(directive.map(str::to_string)),
                active_prompt: Set(update.active_prompt.clone()),
                latest_response: Set(Some(update.latest_response.clone())),
                created_at: Set(now.to_string()),
                updated_at: Set(now.to_string()),
            };
            conversations::Entity::insert(record).exec(db)?;
        }
    }
    Ok(())
}

fn insert_in<C: ConnectionTrait>(
    db: &C,
    conversation_id: ConversationId,
    batch: &[NewMessage],
) -> Result<InsertOutcome, DbErr> {
    if batch.is_empty() {
        return Ok(InsertOutcome::default());
    }

    let candidate_ids: Vec<String> = batch.iter().map(|m| m.status_id.clone()).collect();
    let mut seen: HashSet<String> = messages::Entity::find()
        .select_only()
        .column(messages::Column::StatusId)
        .filter(messages::Column::StatusId.is_in(candidate_ids))
        .into_tuple::<String>()
        .all(db)?
        .into_iter()
        .collect();

    let mut outcome = InsertOutcome::default();
    for message in batch {
        if !seen.insert(message.status_id.clone()) {
            outcome.skipped += 1;
            continue;
        }

        let record = messages::ActiveModel {
            id: NotSet,
            conversation_id: Set(conversation_id),
            status_id: Set(message.status_id.clone()),
            author: Set(message.author.clone()),
            content: Set(message.content.clone()),
            url: Set(message.url.clone()),
            is_self_authored: Set(message.is_self_authored),
            observed_at: Set(message.observed_at.map(format_timestamp)),
        };
        messages::Entity::insert(record).exec(db)?;
        outcome.inserted += 1;
    }
    Ok(outcome)
}

/// Oldest first; posts without a creation time sort ahead of the rest.
fn ordered_messages<C: ConnectionTrait>(
    db: &C,
    conversation_id: ConversationId,
) -> Result<Vec<StoredMessage>, DbErr> {
    let rows = messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .order_by_asc(messages::Column::ObservedAt)
        .order_by_asc(messages::Column::Id)
        .all(db)?;
    Ok(rows.into_iter().map(StoredMessage::from).collect())
}

fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// `updated_at` never moves backwards, even when the wall clock does.
fn later(previous: &str, now: String) -> String {
    if previous > now.as_str() {
        previous.to_string()
    } else {
        now
    }
}

impl From<messages::Model> for StoredMessage {
    fn from(m: messages::Model) -> Self {
        Self {
            status_id: m.status_id,
            author: m.author,
            content: m.content,
            url: m.url,
            is_self_authored: m.is_self_authored,
            observed_at: m.observed_at,
        }
    }
}
