//! Locate the JSON payload inside a free-text model reply.
//!
//! Vision models rarely answer with bare JSON even when told to. Typical
//! replies wrap the object in a ```` ```json ```` fence, prepend "Here is the
//! result:", or append a paragraph of advice. This stage only finds the most
//! plausible substring; it never parses. Greedy first-to-last bracket
//! matching keeps nested braces of the real payload intact and may over-capture
//! trailing prose, which the repairer trims.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?i:json)?\s*(.*?)```").unwrap());

/// Return the most plausible JSON substring of `text`, or `None` when there is
/// nothing JSON-shaped in it.
///
/// Attempts, first success wins:
/// 1. interior of the first fenced code block (the rest of the text is dropped)
/// 2. text starting with `{` / `[`: from there to the last `}` / `]`
/// 3. first `{` to last `}`
/// 4. first `[` to last `]`
/// 5. first `{` to end of text, for replies cut off by the token limit
pub fn extract_json_block(text: &str) -> Option<&str> {
    let mut cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(caps) = RE_FENCE.captures(cleaned) {
        if let Some(inner) = caps.get(1) {
            cleaned = inner.as_str().trim();
        }
    }

    if cleaned.starts_with('{') {
        if let Some(span) = span(cleaned, '{', '}') {
            return Some(span);
        }
    } else if cleaned.starts_with('[') {
        if let Some(span) = span(cleaned, '[', ']') {
            return Some(span);
        }
    }

    span(cleaned, '{', '}')
        .or_else(|| span(cleaned, '[', ']'))
        .or_else(|| truncated_object(cleaned))
}

/// First `open` through the last `close`, when the close comes after the open.
fn span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn truncated_object(text: &str) -> Option<&str> {
    text.find('{').map(|start| text[start..].trim_end())
}
