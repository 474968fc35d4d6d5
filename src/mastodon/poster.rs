use super::{Timeline, Visibility};
use crate::segment::split_into_segments;
use crate::thread::ThreadMessage;
use anyhow::Result;
use tracing::{error, info};

/// Post `text` as a chain of numbered replies under `reply_to_id`.
///
/// The first segment mentions `author` and uses `visibility`; follow-ups drop
/// from public to unlisted. Posting stops at the first failed segment and the
/// posts made so far are returned.
pub async fn post_reply_thread(
    timeline: &dyn Timeline,
    text: &str,
    author: &str,
    reply_to_id: &str,
    visibility: Visibility,
    max_len: usize,
) -> Result<Vec<ThreadMessage>> {
    // The mention prefix eats into the first segment.
    let mention = format!("@{} ", author);
    let segments = split_into_segments(text, max_len.saturating_sub(mention.chars().count()))?;
    info!("Posting {} segments", segments.len());

    let follow_up = match visibility {
        Visibility::Public => Visibility::Unlisted,
        other => other,
    };

    let mut posted: Vec<ThreadMessage> = Vec::with_capacity(segments.len());
    for (idx, segment) in segments.iter().enumerate() {
        let (body, vis) = if idx == 0 {
            (format!("{}{}", mention, segment), visibility)
        } else {
            (segment.clone(), follow_up)
        };
        let parent = posted
            .last()
            .map(|p| p.status_id.as_str())
            .unwrap_or(reply_to_id);

        info!(
            "Reply {}/{}: {}...",
            idx + 1,
            segments.len(),
            body.chars().take(60).collect::<String>()
        );

        match timeline.post_status(&body, vis, Some(parent)).await {
            Ok(status) => {
                info!("Posted reply {} (ID: {})", idx + 1, status.status_id);
                posted.push(status);
            }
            Err(e) => {
                error!("Failed to post segment {}: {:#}", idx + 1, e);
                break;
            }
        }
    }

    Ok(posted)
}
