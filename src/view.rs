use crate::snowflake::timestamp_of;
use crate::store::{ConversationId, ConversationStore, StoredConversation};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};

const PROMPT_PREVIEW: usize = 200;
const MESSAGE_PREVIEW: usize = 100;

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

pub async fn list(store: &ConversationStore, limit: u64) -> Result<()> {
    let conversations = store.list_conversations(limit).await?;
    if conversations.is_empty() {
        println!("No conversations stored yet.");
        return Ok(());
    }

    println!("{:<20} {:>8}  {:<25} directive", "id", "messages", "updated");
    for c in conversations {
        println!(
            "{:<20} {:>8}  {:<25} {}",
            c.id,
            c.message_count,
            c.updated_at,
            c.custom_directive
                .as_deref()
                .map(|d| preview(d, 40))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

pub async fn show(store: &ConversationStore, id: ConversationId) -> Result<()> {
    match store.load_conversation(id).await? {
        Some(conversation) => print!("{}", render(&conversation)),
        None => println!("Conversation {} not found.", id),
    }
    Ok(())
}

pub async fn latest(store: &ConversationStore) -> Result<()> {
    match store.list_conversations(1).await?.first() {
        Some(summary) => show(store, summary.id).await,
        None => {
            println!("No conversations stored yet.");
            Ok(())
        }
    }
}

fn render(c: &StoredConversation) -> String {
    let issued = i64::try_from(timestamp_of(c.id))
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "-".to_string());
    let mut out = format!(
        "Conversation {}\n  id issued: {}\n  created: {}\n  updated: {}\n",
        c.id, issued, c.created_at, c.updated_at
    );
    if let Some(directive) = &c.custom_directive {
        out.push_str(&format!("  directive: {}\n", directive));
    }
    if let Some(prompt) = &c.active_prompt {
        out.push_str(&format!("  prompt: {}\n", preview(prompt, PROMPT_PREVIEW)));
    }
    if let Some(response) = &c.latest_response {
        out.push_str(&format!(
            "  latest response: {}\n",
            preview(response, PROMPT_PREVIEW)
        ));
    }

    out.push_str(&format!("\nMessages ({}):\n", c.messages.len()));
    for (i, m) in c.messages.iter().enumerate() {
        let marker = if m.is_self_authored { " [BOT]" } else { "" };
        out.push_str(&format!(
            "{:>3}. @{}{}: {}\n",
            i + 1,
            m.author,
            marker,
            preview(&m.content, MESSAGE_PREVIEW)
        ));
    }
    out
}
