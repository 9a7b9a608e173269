//! 下载主流程编排。
//!
//! 入口页 → 阅读器框架 → 总页数 → 寻址模式 → 逐页渲染 → 可选合并。

use std::path::Path;

use tracing::{debug, info, warn};

use super::capture::{CaptureOutcome, capture_page, close_after};
use super::error::{Control, ScrapeError};
use super::locator::{NavState, SequentialNavigator, collect_page_addresses, detect_mode};
use super::models::{
    AddressingMode, DownloadOptions, DownloadReport, DownloadTarget, PageCount, ProgressHooks,
    Shelf,
};
use super::pagination::discover_page_count;
use super::pool::run_bounded;
use super::progress::{ProgressReporter, make_reporter};
use crate::base_system::book_paths::ensure_book_dir;
use crate::browser::BrowserTab;

/// Downloads one book from a shelf's browser session.
pub struct BookDownloader<'s> {
    shelf: &'s Shelf,
    target: DownloadTarget,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    captured: u32,
    skipped: u32,
}

impl Tally {
    fn record(&mut self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Rendered => self.captured += 1,
            CaptureOutcome::Kept => self.skipped += 1,
        }
    }
}

struct Harvest {
    mode: AddressingMode,
    count: PageCount,
    tally: Tally,
}

impl<'s> BookDownloader<'s> {
    pub fn new(shelf: &'s Shelf, target: DownloadTarget) -> Self {
        Self { shelf, target }
    }

    /// Saves every page as `page_{NNNN}.pdf` under `out_dir/<book folder>`
    /// and merges them when `options.merge_pdfs` is set.
    ///
    /// On failure the pages already written stay on disk and no merge runs.
    /// Every tab opened during the run is closed before this returns.
    pub async fn download(
        &self,
        out_dir: &Path,
        options: DownloadOptions,
    ) -> Result<DownloadReport, ScrapeError> {
        let (options, hooks) = options.split_hooks();
        let save_dir = ensure_book_dir(out_dir, &self.target.url, self.target.title.as_deref())
            .map_err(|source| ScrapeError::Io {
                path: out_dir.to_path_buf(),
                source,
            })?;
        info!(target: "download", url = %self.target.url, dir = %save_dir.display(), "开始下载");

        let frame_url = self.resolve_frame_url().await?;

        let tab = self.shelf.browser.new_tab().await?;
        let result = self
            .harvest(tab.as_ref(), &frame_url, &save_dir, &options, hooks)
            .await;
        let harvest = close_after(tab.as_ref(), result).await?;

        let merged = if options.merge_pdfs {
            Some(self.shelf.merger.merge(&save_dir, harvest.count).await?)
        } else {
            None
        };

        info!(
            target: "download",
            pages = harvest.count.get(),
            captured = harvest.tally.captured,
            skipped = harvest.tally.skipped,
            mode = %harvest.mode,
            "下载完成"
        );
        Ok(DownloadReport {
            save_dir,
            page_count: harvest.count.get(),
            mode: harvest.mode,
            captured: harvest.tally.captured,
            skipped: harvest.tally.skipped,
            merged,
        })
    }

    /// Address of the viewer frame embedded in the entry page. Entry pages
    /// without a frame are the viewer themselves.
    async fn resolve_frame_url(&self) -> Result<String, ScrapeError> {
        let tab = self.shelf.browser.new_tab().await?;
        let result = self.read_frame_url(tab.as_ref()).await;
        close_after(tab.as_ref(), result).await
    }

    async fn read_frame_url(&self, tab: &dyn BrowserTab) -> Result<String, ScrapeError> {
        let options = &self.shelf.options;
        let selector = &options.selectors.book_frame;
        tab.goto(&self.target.url, options.timeout).await?;

        if !tab.exists(selector).await? {
            debug!(target: "download", "入口页没有阅读器框架，直接使用入口地址");
            return Ok(self.target.url.clone());
        }
        let src = tab
            .property(selector, "src")
            .await?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ScrapeError::missing(Control::BookFrame))?;
        debug!(target: "download", frame = %src, "阅读器框架地址");
        Ok(src)
    }

    async fn harvest(
        &self,
        tab: &dyn BrowserTab,
        frame_url: &str,
        save_dir: &Path,
        options: &DownloadOptions,
        hooks: ProgressHooks,
    ) -> Result<Harvest, ScrapeError> {
        let shelf_options = &self.shelf.options;
        tab.goto(frame_url, shelf_options.timeout).await?;

        let count = discover_page_count(
            tab,
            &shelf_options.selectors.total_pages,
            shelf_options.poll_interval,
            shelf_options.pagination_max_wait,
        )
        .await?;
        let mode = detect_mode(tab, shelf_options).await?;
        info!(target: "download", pages = count.get(), %mode, "阅读器就绪");

        let mut progress = make_reporter(&self.target.url, count, options.progress_bar, hooks);
        progress.start();

        let tally = match mode {
            AddressingMode::Direct => {
                self.capture_direct(tab, count, save_dir, options, &mut progress)
                    .await?
            }
            AddressingMode::Sequential => {
                self.capture_sequential(tab, count, save_dir, options, &mut progress)
                    .await?
            }
        };
        progress.finish();
        Ok(Harvest { mode, count, tally })
    }

    async fn capture_direct(
        &self,
        tab: &dyn BrowserTab,
        count: PageCount,
        save_dir: &Path,
        options: &DownloadOptions,
        progress: &mut ProgressReporter,
    ) -> Result<Tally, ScrapeError> {
        let addresses = collect_page_addresses(tab, count, &self.shelf.options).await?;
        let addresses: &[String] = &addresses;
        let shelf = self.shelf;
        let render = &options.render;
        let skip_existing = options.skip_existing;

        let mut tally = Tally::default();
        run_bounded(
            addresses.len(),
            options.concurrency,
            move |idx| {
                let page_no = idx as u32 + 1;
                capture_page(shelf, &addresses[idx], save_dir, page_no, render, skip_existing)
            },
            |_, outcome| {
                tally.record(outcome);
                progress.page_done();
            },
        )
        .await?;
        Ok(tally)
    }

    async fn capture_sequential(
        &self,
        tab: &dyn BrowserTab,
        count: PageCount,
        save_dir: &Path,
        options: &DownloadOptions,
        progress: &mut ProgressReporter,
    ) -> Result<Tally, ScrapeError> {
        if options.concurrency > 1 {
            debug!(target: "download", "顺序翻页模式下并发数固定为 1");
        }
        let mut navigator = SequentialNavigator::new(tab, &self.shelf.options, count);
        navigator.enter().await?;

        let mut tally = Tally::default();
        while let NavState::AtPage(page_no) = navigator.state() {
            let address = navigator.current_address().await?;
            let outcome = capture_page(
                self.shelf,
                &address,
                save_dir,
                page_no,
                &options.render,
                options.skip_existing,
            )
            .await
            .inspect_err(|e| warn!(target: "download", page_no, "页面渲染失败: {e}"))?;
            tally.record(outcome);
            progress.page_done();
            navigator.advance().await?;
        }
        Ok(tally)
    }
}

/// Convenience wrapper around [`BookDownloader::download`].
pub async fn download_book(
    shelf: &Shelf,
    target: DownloadTarget,
    out_dir: impl AsRef<Path>,
    options: DownloadOptions,
) -> Result<DownloadReport, ScrapeError> {
    BookDownloader::new(shelf, target)
        .download(out_dir.as_ref(), options)
        .await
}
