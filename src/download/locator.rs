//! 页面定位：直接寻址与顺序翻页两种策略。
//!
//! Direct addressing reads every page's image address up front by typing
//! page numbers into the viewer's go-to form. Sequential navigation is for
//! viewers whose image addresses are per-session tokens: the only reachable
//! page is the one currently shown, so the frame tab is walked forward one
//! page at a time by `SequentialNavigator`.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::error::{Control, ScrapeError};
use super::models::{AddressingMode, AddressingPreference, PageCount, ShelfOptions};
use crate::browser::{BrowserError, BrowserTab};

/// Picks the addressing mode once per run.
///
/// Auto-detection prefers direct addressing when the go-to form exists and
/// falls back to sequential navigation when only a next button is present.
pub async fn detect_mode(
    tab: &dyn BrowserTab,
    options: &ShelfOptions,
) -> Result<AddressingMode, ScrapeError> {
    if let AddressingPreference::Force(mode) = options.addressing {
        debug!(target: "download", %mode, "addressing mode forced by configuration");
        return Ok(mode);
    }
    let sel = &options.selectors;
    if tab.exists(&sel.go_page_form).await? {
        return Ok(AddressingMode::Direct);
    }
    if tab.exists(&sel.next_page).await? {
        return Ok(AddressingMode::Sequential);
    }
    Err(ScrapeError::missing(Control::GoPageForm))
}

/// How a navigation action was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    /// The page image address changed.
    Changed,
    /// No change was observed before the settle delay ran out.
    DelayElapsed,
}

/// Waits until the page image's address differs from `previous`, polling
/// every `poll` and giving up after `settle`.
pub(crate) async fn await_page_change(
    tab: &dyn BrowserTab,
    image_selector: &str,
    previous: Option<&str>,
    settle: Duration,
    poll: Duration,
) -> Result<Settled, ScrapeError> {
    let deadline = Instant::now() + settle;
    loop {
        let current = tab.property(image_selector, "src").await?;
        if let Some(src) = current.as_deref()
            && !src.is_empty()
            && Some(src) != previous
        {
            return Ok(Settled::Changed);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!(target: "download", ?previous, "no page change observed, settle delay elapsed");
            return Ok(Settled::DelayElapsed);
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// Reads the address of every page through the go-to form, in page order.
pub async fn collect_page_addresses(
    tab: &dyn BrowserTab,
    count: PageCount,
    options: &ShelfOptions,
) -> Result<Vec<String>, ScrapeError> {
    let sel = &options.selectors;
    if !tab.exists(&sel.go_page_form).await? {
        return Err(ScrapeError::missing(Control::GoPageForm));
    }
    if !tab.exists(&sel.current_page_input).await? {
        return Err(ScrapeError::missing(Control::CurrentPageInput));
    }

    let mut addresses: Vec<String> = Vec::with_capacity(count.get() as usize);
    for page in count.pages() {
        // The viewer may open on any page, so compare against what it shows
        // right now rather than against the previous page's address.
        let before = tab.property(&sel.page_image, "src").await?;
        if !tab
            .type_and_submit(&sel.current_page_input, &page.to_string())
            .await?
        {
            return Err(ScrapeError::missing_at(Control::CurrentPageInput, page));
        }
        await_page_change(
            tab,
            &sel.page_image,
            before.as_deref(),
            options.settle_delay,
            options.readiness_poll,
        )
        .await?;

        let src = tab
            .property(&sel.page_image, "src")
            .await?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ScrapeError::missing_at(Control::PageImage, page))?;
        debug!(target: "download", page, %src, "page address located");
        addresses.push(src);
    }

    info!(target: "download", pages = addresses.len(), "all page addresses located");
    Ok(addresses)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    AwaitingCount,
    AtPage(u32),
    Done,
}

/// Walks the viewer from the first to the last page on one tab.
///
/// Holds the frame tab for the whole walk; each step takes `&mut self`, so
/// no two operations can drive the tab at once.
pub struct SequentialNavigator<'t> {
    tab: &'t dyn BrowserTab,
    options: &'t ShelfOptions,
    count: PageCount,
    state: NavState,
    last_src: Option<String>,
}

impl<'t> SequentialNavigator<'t> {
    pub fn new(tab: &'t dyn BrowserTab, options: &'t ShelfOptions, count: PageCount) -> Self {
        Self {
            tab,
            options,
            count,
            state: NavState::AwaitingCount,
            last_src: None,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    /// `AwaitingCount → AtPage(1)`: jump to the first page when the viewer
    /// offers a control for it, then let the viewer settle.
    pub async fn enter(&mut self) -> Result<(), ScrapeError> {
        debug_assert_eq!(self.state, NavState::AwaitingCount);
        let sel = &self.options.selectors;
        if let Some(first) = sel.first_page() {
            let before = self.tab.property(&sel.page_image, "src").await?;
            if self.tab.click(first).await? {
                await_page_change(
                    self.tab,
                    &sel.page_image,
                    before.as_deref(),
                    self.options.settle_delay,
                    self.options.readiness_poll,
                )
                .await?;
            } else {
                debug!(target: "download", "no jump-to-first control, assuming viewer starts at page 1");
            }
        }
        self.state = NavState::AtPage(1);
        Ok(())
    }

    /// Address of the page currently shown. Waits up to the run timeout for
    /// the page image to appear; only that timeout counts as a missing image.
    pub async fn current_address(&mut self) -> Result<String, ScrapeError> {
        let NavState::AtPage(page) = self.state else {
            return Err(ScrapeError::missing(Control::PageImage));
        };
        let sel = &self.options.selectors.page_image;
        self.tab
            .wait_for_selector(sel, self.options.timeout)
            .await
            .map_err(|e| match e {
                BrowserError::Timeout { .. } => ScrapeError::missing_at(Control::PageImage, page),
                other => ScrapeError::Browser(other),
            })?;
        let src = self
            .tab
            .property(sel, "src")
            .await?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ScrapeError::missing_at(Control::PageImage, page))?;
        self.last_src = Some(src.clone());
        Ok(src)
    }

    /// `AtPage(n) → AtPage(n + 1)`, or `→ Done` after the last page.
    pub async fn advance(&mut self) -> Result<NavState, ScrapeError> {
        let NavState::AtPage(page) = self.state else {
            return Ok(self.state);
        };
        if page >= self.count.get() {
            self.state = NavState::Done;
            return Ok(self.state);
        }

        let sel = &self.options.selectors;
        if !self.tab.click(&sel.next_page).await? {
            return Err(ScrapeError::missing_at(Control::NextButton, page));
        }
        let settled = await_page_change(
            self.tab,
            &sel.page_image,
            self.last_src.as_deref(),
            self.options.settle_delay,
            self.options.readiness_poll,
        )
        .await?;
        debug!(target: "download", from = page, ?settled, "advanced to next page");

        self.state = NavState::AtPage(page + 1);
        Ok(self.state)
    }
}
