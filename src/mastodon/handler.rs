use super::poster::post_reply_thread;
use super::types::{Notification, Status};
use super::{ReplyVisibility, Timeline};
use crate::agent::{Generator, build_system_prompt, determine_active_prompt};
use crate::store::{ConversationStore, ConversationUpdate, InsertOutcome};
use crate::thread::ThreadMatcher;
use crate::transcript::TranscriptBuilder;
use crate::utils::remove_markdown;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

pub struct HandlerSettings {
    /// Handle of the bot account, as it appears in `acct`.
    pub self_acct: String,
    pub character_prompt: String,
    pub visibility: ReplyVisibility,
    pub max_post_len: usize,
}

pub struct MentionHandler {
    timeline: Arc<dyn Timeline>,
    generator: Arc<dyn Generator>,
    store: Arc<ConversationStore>,
    matcher: ThreadMatcher,
    transcripts: TranscriptBuilder,
    settings: HandlerSettings,
}

impl MentionHandler {
    pub fn new(
        timeline: Arc<dyn Timeline>,
        generator: Arc<dyn Generator>,
        store: Arc<ConversationStore>,
        matcher: ThreadMatcher,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            timeline,
            generator,
            transcripts: TranscriptBuilder::new(store.clone()),
            store,
            matcher,
            settings,
        }
    }

    /// Errors are logged here and never reach the notification loop.
    pub async fn on_notification(&self, notification: &Notification) {
        if notification.kind != "mention" {
            return;
        }
        let Some(status) = &notification.status else {
            return;
        };
        if status.account.acct == self.settings.self_acct {
            return;
        }

        info!(
            "Mention from @{}: {}",
            status.account.acct,
            status.plain_text()
        );

        if let Err(e) = self.handle_mention(status).await {
            error!("Error handling mention {}: {:#}", status.id, e);
        }
    }

    pub async fn handle_mention(&self, status: &Status) -> Result<InsertOutcome> {
        let author = status.account.acct.as_str();
        let text = status.plain_text();

        let thread = self.timeline.fetch_thread(status).await?;
        let resolution = self.matcher.resolve(&thread).await?;
        if resolution.is_new() {
            info!("Starting conversation {}", resolution.id());
        }
        let history = self.transcripts.history(resolution).await?;

        let active = determine_active_prompt(&text, history.as_ref(), &self.settings.character_prompt);
        let system_prompt = build_system_prompt(&active.prompt);

        if let Err(e) = self.timeline.favourite(&status.id).await {
            error!("Failed to favourite status: {:#}", e);
        }

        let custom_directive = active.new_directive.clone().or_else(|| {
            history
                .as_ref()
                .and_then(|h| h.custom_directive.clone())
                .filter(|d| !d.is_empty())
        });

        let prompt = self
            .transcripts
            .build(history.as_ref(), &thread, custom_directive.as_deref());

        let response = self.generator.generate(&system_prompt, &prompt).await?;
        info!(
            "AI response: {}...",
            response.chars().take(50).collect::<String>()
        );
        let clean = remove_markdown(&response);

        let posted = post_reply_thread(
            self.timeline.as_ref(),
            &clean,
            author,
            &status.id,
            self.settings.visibility.resolve(status.visibility),
            self.settings.max_post_len,
        )
        .await?;

        let mut messages: Vec<_> = thread
            .iter()
            .map(|m| m.to_new_message(m.author == self.settings.self_acct))
            .collect();
        messages.extend(posted.iter().map(|m| m.to_new_message(true)));

        let outcome = self
            .store
            .save_exchange(
                ConversationUpdate {
                    id: resolution.id(),
                    custom_directive,
                    active_prompt: Some(active.prompt),
                    latest_response: response,
                },
                messages,
            )
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastodon::Visibility;
    use crate::mastodon::testing::{FakeTimeline, status};
    use crate::snowflake::SnowflakeGenerator;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeGenerator {
        reply: String,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), prompt.to_string()));
            Ok(self.reply.clone())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<ConversationStore>,
        timeline: Arc<FakeTimeline>,
        generator: Arc<FakeGenerator>,
        handler: MentionHandler,
    }

    async fn fixture(reply: &str) -> Fixture {
        let dir = tempdir().unwrap();
        let store = ConversationStore::open(dir.path()).await.unwrap();
        let timeline = Arc::new(FakeTimeline::new("tootclaw"));
        let generator = Arc::new(FakeGenerator {
            reply: reply.to_string(),
            ..Default::default()
        });
        let matcher = ThreadMatcher::new(store.clone(), Arc::new(SnowflakeGenerator::new(1, 1)));
        let handler = MentionHandler::new(
            timeline.clone(),
            generator.clone(),
            store.clone(),
            matcher,
            HandlerSettings {
                self_acct: "tootclaw".to_string(),
                character_prompt: "a cheerful robot".to_string(),
                visibility: ReplyVisibility::Follow,
                max_post_len: 400,
            },
        );
        Fixture {
            _dir: dir,
            store,
            timeline,
            generator,
            handler,
        }
    }

    #[tokio::test]
    async fn continues_a_conversation_across_mentions() {
        let f = fixture("**Hi** bob!").await;

        let a = status("A", "bob", "hello");
        f.timeline.set_thread(vec![a.clone()]);
        f.handler.handle_mention(&a).await.unwrap();

        let posted = f.timeline.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].text, "@bob 1/1: Hi bob!");
        assert_eq!(posted[0].in_reply_to_id.as_deref(), Some("A"));
        assert_eq!(f.timeline.favourited(), vec!["A"]);

        let first = f.store.list_conversations(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message_count, 2);
        let n = first[0].id;

        let loaded = f.store.load_conversation(n).await.unwrap().unwrap();
        assert_eq!(loaded.latest_response.as_deref(), Some("**Hi** bob!"));
        assert_eq!(loaded.active_prompt.as_deref(), Some("a cheerful robot"));
        assert!(loaded.messages.iter().any(|m| m.is_self_authored));

        // The re-fetched thread now holds the bot reply and a new post.
        let reply = status(&posted[0].id, "tootclaw", &posted[0].text);
        let b = status("B", "bob", "world");
        f.timeline.set_thread(vec![a, reply, b.clone()]);
        f.handler.handle_mention(&b).await.unwrap();

        let all = f.store.list_conversations(10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, n);
        assert_eq!(all[0].message_count, 4);

        let calls = f.generator.calls.lock().unwrap();
        let (_, second_prompt) = &calls[1];
        let hello = second_prompt.find("bob: hello").unwrap();
        let world = second_prompt.find("bob: world").unwrap();
        assert!(hello < world);
        assert_eq!(second_prompt.matches("bob: hello").count(), 1);
    }

    #[tokio::test]
    async fn directive_sets_the_character_and_is_kept() {
        let f = fixture("Meow.").await;

        let a = status("A", "bob", "/* grumpy cat */ meow");
        f.timeline.set_thread(vec![a.clone()]);
        f.handler.handle_mention(&a).await.unwrap();

        {
            let calls = f.generator.calls.lock().unwrap();
            let (system, prompt) = &calls[0];
            assert!(system.ends_with("grumpy cat"));
            assert!(prompt.contains("bob: meow"));
            assert!(!prompt.contains("/*"));
        }

        let b = status("B", "bob", "are you still a cat?");
        f.timeline.set_thread(vec![a, b.clone()]);
        f.handler.handle_mention(&b).await.unwrap();

        let calls = f.generator.calls.lock().unwrap();
        assert!(calls[1].0.ends_with("grumpy cat"));

        let id = f.store.list_conversations(1).await.unwrap()[0].id;
        let loaded = f.store.load_conversation(id).await.unwrap().unwrap();
        assert_eq!(loaded.custom_directive.as_deref(), Some("grumpy cat"));
    }

    #[tokio::test]
    async fn reply_visibility_follows_the_mention() {
        let f = fixture(&"Sentence number one is here. ".repeat(20)).await;

        let mut a = status("A", "bob", "tell me a story");
        a.visibility = Visibility::Public;
        f.timeline.set_thread(vec![a.clone()]);
        f.handler.handle_mention(&a).await.unwrap();

        let posted = f.timeline.posted();
        assert!(posted.len() > 1);
        assert_eq!(posted[0].visibility, Visibility::Public);
        assert!(posted[1..].iter().all(|p| p.visibility == Visibility::Unlisted));
        assert_eq!(posted[1].in_reply_to_id.as_deref(), Some(posted[0].id.as_str()));
        assert!(posted.iter().all(|p| p.text.chars().count() <= 400));
    }

    #[tokio::test]
    async fn ignores_own_mentions_and_other_notifications() {
        let f = fixture("hi").await;
        let own = status("S", "tootclaw", "talking to myself");
        f.timeline.set_thread(vec![own.clone()]);

        f.handler
            .on_notification(&Notification {
                id: "1".to_string(),
                kind: "mention".to_string(),
                status: Some(own.clone()),
            })
            .await;
        f.handler
            .on_notification(&Notification {
                id: "2".to_string(),
                kind: "favourite".to_string(),
                status: Some(own),
            })
            .await;

        assert!(f.timeline.posted().is_empty());
        assert!(f.store.list_conversations(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_generation_stores_nothing() {
        struct Broken;

        #[async_trait]
        impl Generator for Broken {
            async fn generate(&self, _: &str, _: &str) -> Result<String> {
                anyhow::bail!("model unavailable")
            }
        }

        let dir = tempdir().unwrap();
        let store = ConversationStore::open(dir.path()).await.unwrap();
        let timeline = Arc::new(FakeTimeline::new("tootclaw"));
        let matcher = ThreadMatcher::new(store.clone(), Arc::new(SnowflakeGenerator::new(1, 1)));
        let handler = MentionHandler::new(
            timeline.clone(),
            Arc::new(Broken),
            store.clone(),
            matcher,
            HandlerSettings {
                self_acct: "tootclaw".to_string(),
                character_prompt: "robot".to_string(),
                visibility: ReplyVisibility::Follow,
                max_post_len: 400,
            },
        );

        let a = status("A", "bob", "hello");
        timeline.set_thread(vec![a.clone()]);
        assert!(handler.handle_mention(&a).await.is_err());

        assert!(timeline.posted().is_empty());
        assert!(store.list_conversations(10).await.unwrap().is_empty());
    }
}
