use thiserror::Error;

/// Room kept free for the `"{index}/{total}: "` prefix when the post limit allows it.
const PREFIX_HEADROOM: usize = 100;

const SENTENCE_TERMINATORS: &[char] = &['。', '．', '.', '！', '？', '!', '?'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Post limit of {max_len} characters cannot fit a numbered segment")]
    LimitTooSmall { max_len: usize },
}

/// Split `text` into numbered segments of at most `max_len` characters each.
///
/// Sentences stay whole unless a single sentence is longer than the working
/// limit, in which case it is cut into fixed-length chunks. An empty (or
/// whitespace-only) input yields no segments.
pub fn split_into_segments(text: &str, max_len: usize) -> Result<Vec<String>, SegmentError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    if max_len > PREFIX_HEADROOM {
        let segments = pack_sentences(text, max_len - PREFIX_HEADROOM);
        return Ok(number(segments));
    }

    // Small limits: reserve exactly the prefix width, growing it until the
    // segment count it produces fits.
    let mut assumed_total = 1;
    loop {
        let width = prefix_width(assumed_total);
        if width >= max_len {
            return Err(SegmentError::LimitTooSmall { max_len });
        }
        let segments = pack_sentences(text, max_len - width);
        if prefix_width(segments.len()) <= width {
            return Ok(number(segments));
        }
        assumed_total = segments.len();
    }
}

fn prefix_width(total: usize) -> usize {
    let digits = total.to_string().len();
    digits * 2 + 3
}

fn number(segments: Vec<String>) -> Vec<String> {
    let total = segments.len();
    segments
        .into_iter()
        .enumerate()
        .map(|(i, seg)| format!("{}/{}: {}", i + 1, total, seg))
        .collect()
}

/// Sentence units, each keeping its terminator run and the whitespace after it.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !SENTENCE_TERMINATORS.contains(&c) {
            continue;
        }
        while let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }
        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        out.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Greedy packing into untrimmed segments of at most `limit` characters, then
/// trimmed, with blank ones dropped.
fn pack_sentences(text: &str, limit: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        let len = sentence.chars().count();

        if len > limit {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = sentence.chars().collect();
            let mut chunks = chars.chunks(limit).peekable();
            while let Some(chunk) = chunks.next() {
                if chunks.peek().is_some() {
                    segments.push(chunk.iter().collect());
                } else {
                    current = chunk.iter().collect();
                    current_len = chunk.len();
                }
            }
            continue;
        }

        if current_len + len > limit && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(sentence);
        current_len += len;
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
