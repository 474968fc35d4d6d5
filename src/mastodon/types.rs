use crate::thread::ThreadMessage;
use crate::utils::strip_html;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
}

/// Configured visibility for replies; `follow` mirrors the mention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyVisibility {
    #[default]
    Follow,
    Public,
    Unlisted,
    Private,
    Direct,
}

impl ReplyVisibility {
    pub fn resolve(self, mention: Visibility) -> Visibility {
        match self {
            ReplyVisibility::Follow => mention,
            ReplyVisibility::Public => Visibility::Public,
            ReplyVisibility::Unlisted => Visibility::Unlisted,
            ReplyVisibility::Private => Visibility::Private,
            ReplyVisibility::Direct => Visibility::Direct,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub acct: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    pub account: Account,
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Status {
    pub fn plain_text(&self) -> String {
        strip_html(&self.content)
    }

    pub fn to_thread_message(&self) -> ThreadMessage {
        ThreadMessage {
            status_id: self.id.clone(),
            author: self.account.acct.clone(),
            content: self.plain_text(),
            url: self.url.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusContext {
    #[serde(default)]
    pub ancestors: Vec<Status>,
    #[serde(default)]
    pub descendants: Vec<Status>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Option<Status>,
}

#[derive(Debug, Serialize)]
pub(super) struct NewStatus<'a> {
    pub status: &'a str,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mention_notification() {
        let json = r#"{
            "id": "901",
            "type": "mention",
            "account": {"id": "7", "acct": "bob@other.social", "username": "bob"},
            "status": {
                "id": "1001",
                "account": {"id": "7", "acct": "bob@other.social"},
                "content": "<p><span class=\"h-card\"><a href=\"https://example.social/@bot\">@<span>bot</span></a></span> /* grumpy cat */ meow</p>",
                "url": "https://other.social/@bob/1001",
                "created_at": "2025-06-01T12:00:00.000Z",
                "visibility": "unlisted",
                "in_reply_to_id": null
            }
        }"#;

        let notification: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.kind, "mention");

        let status = notification.status.unwrap();
        assert_eq!(status.visibility, Visibility::Unlisted);

        let message = status.to_thread_message();
        assert_eq!(message.status_id, "1001");
        assert_eq!(message.author, "bob@other.social");
        assert_eq!(message.content, "@bot /* grumpy cat */ meow");
        assert!(message.created_at.is_some());
    }

    #[test]
    fn follow_mirrors_mention_visibility() {
        assert_eq!(
            ReplyVisibility::Follow.resolve(Visibility::Private),
            Visibility::Private
        );
        assert_eq!(
            ReplyVisibility::Direct.resolve(Visibility::Public),
            Visibility::Direct
        );
    }

    #[test]
    fn reply_body_omits_missing_parent() {
        let body = NewStatus {
            status: "hello",
            visibility: Visibility::Unlisted,
            in_reply_to_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"status": "hello", "visibility": "unlisted"})
        );
    }
}
