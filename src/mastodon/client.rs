use super::Timeline;
use super::types::{Account, NewStatus, Notification, Status, StatusContext, Visibility};
use crate::thread::ThreadMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const NOTIFICATION_PAGE: &str = "30";

pub struct MastodonClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(base_url: &str, access_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned HTTP {}: {}", what, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode {} response", what))
    }

    pub async fn verify_credentials(&self) -> Result<Account> {
        Self::send(
            self.get("/api/v1/accounts/verify_credentials"),
            "verify_credentials",
        )
        .await
    }

    pub async fn status_context(&self, status_id: &str) -> Result<StatusContext> {
        Self::send(
            self.get(&format!("/api/v1/statuses/{}/context", status_id)),
            "status_context",
        )
        .await
    }

    /// Every mention notification newer than `since_id`, oldest first.
    pub async fn mentions_since(&self, since_id: Option<&str>) -> Result<Vec<Notification>> {
        let mut pages = ForwardPages::new(since_id);
        loop {
            let request = {
                let mut query = vec![("types[]", "mention"), ("limit", NOTIFICATION_PAGE)];
                if let Some(min_id) = pages.cursor() {
                    query.push(("min_id", min_id));
                }
                self.get("/api/v1/notifications").query(&query)
            };
            let page = Self::send(request, "notifications").await?;
            if !pages.push(page) {
                break;
            }
        }
        Ok(pages.into_notifications())
    }

    /// Id of the newest notification of any kind, if there is one.
    pub async fn latest_notification_id(&self) -> Result<Option<String>> {
        let notifications: Vec<Notification> = Self::send(
            self.get("/api/v1/notifications").query(&[("limit", "1")]),
            "notifications",
        )
        .await?;
        Ok(notifications.into_iter().next().map(|n| n.id))
    }
}

/// Forward paging over `min_id` pages, which the server returns newest first.
struct ForwardPages {
    cursor: Option<String>,
    collected: Vec<Notification>,
}

impl ForwardPages {
    fn new(since_id: Option<&str>) -> Self {
        Self {
            cursor: since_id.map(str::to_string),
            collected: Vec::new(),
        }
    }

    fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Returns `false` once a page comes back empty.
    fn push(&mut self, mut page: Vec<Notification>) -> bool {
        page.reverse();
        let Some(newest) = page.last() else {
            return false;
        };
        self.cursor = Some(newest.id.clone());
        self.collected.extend(page);
        true
    }

    fn into_notifications(self) -> Vec<Notification> {
        self.collected
    }
}

#[async_trait]
impl Timeline for MastodonClient {
    async fn fetch_thread(&self, status: &Status) -> Result<Vec<ThreadMessage>> {
        let context = match self.status_context(&status.id).await {
            Ok(context) => context,
            Err(e) => {
                error!("Failed to get thread context: {:#}", e);
                StatusContext::default()
            }
        };

        Ok(context
            .ancestors
            .iter()
            .chain(std::iter::once(status))
            .chain(context.descendants.iter())
            .map(Status::to_thread_message)
            .collect())
    }

    async fn post_status(
        &self,
        text: &str,
        visibility: Visibility,
        in_reply_to_id: Option<&str>,
    ) -> Result<ThreadMessage> {
        let body = NewStatus {
            status: text,
            visibility,
            in_reply_to_id,
        };
        let status: Status = Self::send(self.post("/api/v1/statuses").json(&body), "post_status")
            .await?;
        info!("Posted status (ID: {})", status.id);
        Ok(status.to_thread_message())
    }

    async fn favourite(&self, status_id: &str) -> Result<()> {
        let _: Status = Self::send(
            self.post(&format!("/api/v1/statuses/{}/favourite", status_id)),
            "favourite",
        )
        .await?;
        info!("Favourited status (ID: {})", status_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(id: u64) -> Notification {
        Notification {
            id: id.to_string(),
            kind: "mention".to_string(),
            status: None,
        }
    }

    /// Up to `limit` ids just after `min_id`, newest first.
    fn page_after(all: &[u64], min_id: Option<&str>, limit: usize) -> Vec<Notification> {
        let floor: u64 = min_id.and_then(|id| id.parse().ok()).unwrap_or(0);
        let mut page: Vec<u64> = all.iter().copied().filter(|id| *id > floor).take(limit).collect();
        page.reverse();
        page.into_iter().map(mention).collect()
    }

    #[test]
    fn burst_larger_than_a_page_is_collected_in_order() {
        let pending: Vec<u64> = (101..=135).collect();
        let mut pages = ForwardPages::new(Some("100"));
        let mut requests = 0;

        loop {
            requests += 1;
            let page = page_after(&pending, pages.cursor(), 30);
            if !pages.push(page) {
                break;
            }
        }

        let ids: Vec<u64> = pages
            .into_notifications()
            .iter()
            .map(|n| n.id.parse().unwrap())
            .collect();
        assert_eq!(ids, pending);
        assert_eq!(requests, 3);
    }

    #[test]
    fn empty_page_keeps_the_cursor() {
        let mut pages = ForwardPages::new(Some("7"));
        assert!(!pages.push(Vec::new()));
        assert_eq!(pages.cursor(), Some("7"));
        assert!(pages.into_notifications().is_empty());
    }

    #[test]
    fn cursor_moves_to_newest_of_page() {
        let mut pages = ForwardPages::new(None);
        assert_eq!(pages.cursor(), None);
        assert!(pages.push(vec![mention(12), mention(11), mention(10)]));
        assert_eq!(pages.cursor(), Some("12"));
    }
}
