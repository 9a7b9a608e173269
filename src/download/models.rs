//! 下载相关的数据模型定义。
//!
//! 包含下载目标、书架（共享浏览器会话与全局选项）、页数、寻址模式、进度快照、
//! 下载选项与下载结果等核心数据结构。

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::merge::PdfMerger;
use crate::base_system::context::{Config, ViewerSelectors};
use crate::browser::BrowserSession;

/// The book to download: its entry address plus an optional display title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub title: Option<String>,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Owning container of the shared browser session and run-wide options.
pub struct Shelf {
    pub browser: Arc<dyn BrowserSession>,
    pub merger: Arc<dyn PdfMerger>,
    pub options: ShelfOptions,
}

#[derive(Debug, Clone)]
pub struct ShelfOptions {
    /// Bounds every navigation and explicit element wait.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// `None` polls the page counter forever.
    pub pagination_max_wait: Option<Duration>,
    /// Upper bound on waiting for a page change after a navigation action.
    pub settle_delay: Duration,
    pub readiness_poll: Duration,
    pub addressing: AddressingPreference,
    pub selectors: ViewerSelectors,
}

impl ShelfOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: cfg.timeout(),
            poll_interval: cfg.poll_interval(),
            pagination_max_wait: cfg.pagination_max_wait(),
            settle_delay: cfg.settle_delay(),
            readiness_poll: cfg.readiness_poll(),
            addressing: cfg.addressing_mode.parse().unwrap_or_default(),
            selectors: cfg.selectors.clone(),
        }
    }
}

impl Default for ShelfOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How a page's resource address is obtained. A property of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    /// Every page address is read up front; captures may run in parallel.
    Direct,
    /// Only the page the viewer currently shows is reachable.
    Sequential,
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressingMode::Direct => "direct",
            AddressingMode::Sequential => "sequential",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressingPreference {
    /// Detect from the controls the viewer exposes.
    #[default]
    Auto,
    Force(AddressingMode),
}

impl FromStr for AddressingPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "direct" => Ok(Self::Force(AddressingMode::Direct)),
            "sequential" => Ok(Self::Force(AddressingMode::Sequential)),
            other => Err(format!(
                "unknown addressing mode `{other}` (expected auto, direct or sequential)"
            )),
        }
    }
}

/// Total number of pages; resolved once per run and never revised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageCount(NonZeroU32);

impl PageCount {
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// 1-based page numbers.
    pub fn pages(self) -> impl Iterator<Item = u32> {
        1..=self.get()
    }
}

impl fmt::Display for PageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub target: String,
    pub downloaded_pages: u32,
    pub page_count: u32,
    /// 0.0..=1.0
    pub percentage: f64,
}

pub type ProgressCallback = Box<dyn FnMut(&ProgressSnapshot) + Send>;

/// Page-render overrides; resolved per page into a `PdfRenderSpec`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub paper_width: Option<f64>,
    pub paper_height: Option<f64>,
    /// Size the paper to the page image when no explicit size is set.
    pub fit_to_content: bool,
    pub print_background: bool,
    pub landscape: bool,
    pub scale: f64,
    pub margin: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RenderOptions {
    pub fn from_config(cfg: &Config) -> Self {
        let positive = |v: f64| (v > 0.0).then_some(v);
        Self {
            paper_width: positive(cfg.paper_width_in),
            paper_height: positive(cfg.paper_height_in),
            fit_to_content: cfg.fit_page_to_content,
            print_background: cfg.print_background,
            landscape: cfg.landscape,
            scale: cfg.render_scale.clamp(0.1, 2.0),
            margin: cfg.page_margin_in.max(0.0),
        }
    }
}

pub struct DownloadOptions {
    /// Max simultaneous page captures (direct addressing only).
    pub concurrency: usize,
    pub merge_pdfs: bool,
    /// Keep page PDFs left by an earlier run instead of rendering them again.
    pub skip_existing: bool,
    pub render: RenderOptions,
    /// Draw an `indicatif` bar on stderr.
    pub progress_bar: bool,
    pub on_start: Option<ProgressCallback>,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DownloadOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            concurrency: cfg.concurrency.max(1),
            merge_pdfs: cfg.merge_pdfs,
            skip_existing: cfg.skip_existing_pages,
            render: RenderOptions::from_config(cfg),
            progress_bar: false,
            on_start: None,
            on_progress: None,
        }
    }

    pub fn on_start(mut self, cb: impl FnMut(&ProgressSnapshot) + Send + 'static) -> Self {
        self.on_start = Some(Box::new(cb));
        self
    }

    pub fn on_progress(mut self, cb: impl FnMut(&ProgressSnapshot) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    /// Moves the callbacks out; the remaining settings are fixed for the run.
    pub(crate) fn split_hooks(mut self) -> (Self, ProgressHooks) {
        let hooks = ProgressHooks {
            on_start: self.on_start.take(),
            on_progress: self.on_progress.take(),
        };
        (self, hooks)
    }
}

/// Progress callbacks owned by the reporter of one run.
#[derive(Default)]
pub(crate) struct ProgressHooks {
    pub(crate) on_start: Option<ProgressCallback>,
    pub(crate) on_progress: Option<ProgressCallback>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub save_dir: PathBuf,
    pub page_count: u32,
    pub mode: AddressingMode,
    /// Pages rendered during this run.
    pub captured: u32,
    /// Pages kept from an earlier run.
    pub skipped: u32,
    pub merged: Option<PathBuf>,
}
