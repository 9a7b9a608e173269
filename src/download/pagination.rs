//! 总页数探测。

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::error::ScrapeError;
use super::models::PageCount;
use crate::browser::BrowserTab;

/// Reads the viewer's page counter until it shows a usable number.
///
/// An absent element, empty or non-numeric text, and `0` all mean the viewer
/// has not finished rendering; those are retried every `poll_interval` and
/// never surfaced. A browser failure while reading is returned as-is.
/// With `max_wait = None` this polls forever.
pub async fn discover_page_count(
    tab: &dyn BrowserTab,
    selector: &str,
    poll_interval: Duration,
    max_wait: Option<Duration>,
) -> Result<PageCount, ScrapeError> {
    let started = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let text = tab.text(selector).await?;
        if let Some(count) = text.as_deref().and_then(parse_page_count) {
            info!(target: "download", pages = count.get(), attempts, "page count resolved");
            return Ok(count);
        }
        debug!(target: "download", ?text, attempts, "page counter not ready");

        if let Some(limit) = max_wait
            && started.elapsed() + poll_interval > limit
        {
            return Err(ScrapeError::PaginationTimeout(limit));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Leading-integer parse: surrounding whitespace ignored, digits up to the
/// first non-digit taken. `None` for no digits or zero.
pub fn parse_page_count(text: &str) -> Option<PageCount> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<u32>().ok().and_then(PageCount::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_integer() {
        assert_eq!(parse_page_count("7").map(PageCount::get), Some(7));
        assert_eq!(parse_page_count("  212 \n").map(PageCount::get), Some(212));
        assert_eq!(parse_page_count("48 Seiten").map(PageCount::get), Some(48));
    }

    #[test]
    fn rejects_unpopulated_counter() {
        assert_eq!(parse_page_count(""), None);
        assert_eq!(parse_page_count("abc"), None);
        assert_eq!(parse_page_count("/ 12"), None);
        assert_eq!(parse_page_count("0"), None);
        assert_eq!(parse_page_count("99999999999"), None);
    }
}
