use once_cell::sync::Lazy;
use regex::Regex;

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*(.*?)\*/").unwrap());

static LINE_BREAK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>\s*<p[^>]*>").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

struct MarkdownRule {
    pattern: Lazy<Regex>,
    replacement: &'static str,
}

macro_rules! rule {
    ($re:expr, $rep:expr) => {
        MarkdownRule {
            pattern: Lazy::new(|| Regex::new($re).unwrap()),
            replacement: $rep,
        }
    };
}

// Applied in order; JSON leftovers must go before emphasis unwrapping.
static MARKDOWN_RULES: [MarkdownRule; 15] = [
    rule!(r"(?m)^Loaded cached credentials\..*\n?", ""),
    rule!(r"(?s)\{.*?\}", ""),
    rule!(r"(?m)^[}\]\s]*$", ""),
    rule!(r#"(?m)^\s*[":,\[\]{}]\s*$"#, ""),
    rule!(r#"(?m)^\s*":\s*"#, ""),
    rule!(r"(?s)```.*?```", ""),
    rule!(r"(?m)^#+\s*(.*)$", "$1"),
    rule!(r"\*\*([^*]+)\*\*", "$1"),
    rule!(r"__([^_]+)__", "$1"),
    rule!(r"\*([^*]+)\*", "$1"),
    rule!(r"_([^_]+)_", "$1"),
    rule!(r"\[([^\]]+)\]\([^)]+\)", "$1"),
    rule!(r"(?m)^>\s*", ""),
    rule!(r"`([^`]+)`", "$1"),
    rule!(r"(?m)^[-*_]{3,}\s*$", ""),
];

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// Status HTML to plain text.
pub fn strip_html(html: &str) -> String {
    let text = LINE_BREAK_TAG.replace_all(html, "\n");
    let text = HTML_TAG.replace_all(&text, "");
    decode_entities(&text).trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Generated text tends to come back as Markdown; posts are plain text.
pub fn remove_markdown(text: &str) -> String {
    let mut plain = text.to_string();
    for rule in MARKDOWN_RULES.iter() {
        plain = rule
            .pattern
            .replace_all(&plain, rule.replacement)
            .into_owned();
    }
    BLANK_LINES.replace_all(&plain, "\n\n").trim().to_string()
}

/// The first `/* ... */` span of a post, trimmed. An empty span counts as none.
pub fn extract_directive(text: &str) -> Option<String> {
    DIRECTIVE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|d| !d.is_empty())
}

pub fn strip_directives(text: &str) -> String {
    DIRECTIVE.replace_all(text, "").trim().to_string()
}
