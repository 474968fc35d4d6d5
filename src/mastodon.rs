use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

mod client;
mod handler;
mod poster;
mod types;

use crate::thread::ThreadMessage;
pub use client::MastodonClient;
pub use handler::{HandlerSettings, MentionHandler};
pub use types::{ReplyVisibility, Visibility};
use types::Status;

/// The slice of the Mastodon API the mention pipeline needs.
#[async_trait]
pub trait Timeline: Send + Sync {
    /// Ancestors, the status itself, then descendants.
    async fn fetch_thread(&self, status: &Status) -> Result<Vec<ThreadMessage>>;
    async fn post_status(
        &self,
        text: &str,
        visibility: Visibility,
        in_reply_to_id: Option<&str>,
    ) -> Result<ThreadMessage>;
    async fn favourite(&self, status_id: &str) -> Result<()>;
}

pub struct Bot {
    client: Arc<MastodonClient>,
    handler: MentionHandler,
    startup_message: Option<String>,
    poll_interval: Duration,
}

impl Bot {
    pub fn new(
        client: Arc<MastodonClient>,
        handler: MentionHandler,
        startup_message: Option<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            handler,
            startup_message,
            poll_interval,
        }
    }

    pub async fn start(self) -> Result<()> {
        if let Some(message) = self.startup_message.as_deref().filter(|m| !m.is_empty()) {
            match self
                .client
                .post_status(message, Visibility::Unlisted, None)
                .await
            {
                Ok(_) => info!("Posted startup message"),
                Err(e) => error!("Failed to post startup message: {:#}", e),
            }
        }

        // Only notifications arriving after startup are answered.
        let mut since_id = self.client.latest_notification_id().await?;
        info!("Listening for mentions...");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let notifications = match self.client.mentions_since(since_id.as_deref()).await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to poll notifications: {:#}", e);
                    continue;
                }
            };

            for notification in notifications {
                self.handler.on_notification(&notification).await;
                since_id = Some(notification.id);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::types::Account;
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct PostedStatus {
        pub id: String,
        pub text: String,
        pub visibility: Visibility,
        pub in_reply_to_id: Option<String>,
    }

    /// In-memory timeline that serves a fixed thread and records posts.
    pub struct FakeTimeline {
        acct: String,
        thread: Mutex<Vec<Status>>,
        posted: Mutex<Vec<PostedStatus>>,
        favourited: Mutex<Vec<String>>,
        fail_after: Option<usize>,
    }

    impl FakeTimeline {
        pub fn new(acct: &str) -> Self {
            Self {
                acct: acct.to_string(),
                thread: Mutex::new(Vec::new()),
                posted: Mutex::new(Vec::new()),
                favourited: Mutex::new(Vec::new()),
                fail_after: None,
            }
        }

        /// Posting fails once `n` statuses have been posted.
        pub fn failing_after(acct: &str, n: usize) -> Self {
            Self {
                fail_after: Some(n),
                ..Self::new(acct)
            }
        }

        pub fn set_thread(&self, thread: Vec<Status>) {
            *self.thread.lock().unwrap() = thread;
        }

        pub fn posted(&self) -> Vec<PostedStatus> {
            self.posted.lock().unwrap().clone()
        }

        pub fn favourited(&self) -> Vec<String> {
            self.favourited.lock().unwrap().clone()
        }
    }

    pub fn status(id: &str, acct: &str, content: &str) -> Status {
        Status {
            id: id.to_string(),
            account: Account {
                acct: acct.to_string(),
            },
            content: content.to_string(),
            url: Some(format!("https://example.social/@{}/{}", acct, id)),
            created_at: None,
            visibility: Visibility::Public,
        }
    }

    #[async_trait]
    impl Timeline for FakeTimeline {
        async fn fetch_thread(&self, status: &Status) -> Result<Vec<ThreadMessage>> {
            let thread = self.thread.lock().unwrap();
            if thread.is_empty() {
                return Ok(vec![status.to_thread_message()]);
            }
            Ok(thread.iter().map(Status::to_thread_message).collect())
        }

        async fn post_status(
            &self,
            text: &str,
            visibility: Visibility,
            in_reply_to_id: Option<&str>,
        ) -> Result<ThreadMessage> {
            let mut posted = self.posted.lock().unwrap();
            if self.fail_after.is_some_and(|n| posted.len() >= n) {
                anyhow::bail!("HTTP 500");
            }
            let id = format!("reply-{}", posted.len() + 1);
            posted.push(PostedStatus {
                id: id.clone(),
                text: text.to_string(),
                visibility,
                in_reply_to_id: in_reply_to_id.map(str::to_string),
            });
            Ok(status(&id, &self.acct, text).to_thread_message())
        }

        async fn favourite(&self, status_id: &str) -> Result<()> {
            self.favourited.lock().unwrap().push(status_id.to_string());
            Ok(())
        }
    }
}
