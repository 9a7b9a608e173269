//! 书籍入口链接解析与规范化。

use regex::Regex;
use std::sync::OnceLock;

static RE_URL: OnceLock<Regex> = OnceLock::new();
static RE_SLUG: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("compile RE_URL"))
}

fn re_slug() -> &'static Regex {
    // scheme://host/path, without query or fragment
    RE_SLUG.get_or_init(|| {
        Regex::new(r"^https?://([^/?#]+)([^?#]*)").expect("compile RE_SLUG")
    })
}

/// Extracts the book entry URL from user input.
///
/// Accepts a bare URL or text that contains one (copied link previews, chat
/// messages). Trailing punctuation picked up from prose is dropped.
pub fn parse_book_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let found = re_url().find(trimmed)?.as_str();
    let url = found.trim_end_matches(['.', ',', ';', ')', ']']);
    Some(url.to_string())
}

/// Stable identifier for a book URL, used when the caller gives no title.
///
/// The last non-empty path segment, or the host for a bare domain.
pub fn book_slug(url: &str) -> String {
    let Some(caps) = re_slug().captures(url.trim()) else {
        return url.trim().to_string();
    };
    let host = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    caps.get(2)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .split('/')
        .rev()
        .find(|seg| !seg.is_empty())
        .unwrap_or(host)
        .to_string()
}
