#![allow(dead_code)]

pub mod fake_viewer;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use viewer_book_downloader::base_system::book_paths::merged_pdf_path;
use viewer_book_downloader::base_system::context::ViewerSelectors;
use viewer_book_downloader::download::{
    AddressingPreference, DownloadOptions, MergeError, PageCount, PdfMerger, RenderOptions, Shelf,
    ShelfOptions,
};

use fake_viewer::FakeViewer;

pub const TITLE: &str = "Testbuch";

pub fn fast_shelf_options() -> ShelfOptions {
    ShelfOptions {
        timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
        pagination_max_wait: None,
        settle_delay: Duration::from_millis(20),
        readiness_poll: Duration::from_millis(2),
        addressing: AddressingPreference::Auto,
        selectors: ViewerSelectors::default(),
    }
}

pub fn shelf(viewer: &FakeViewer, merger: Arc<dyn PdfMerger>) -> Shelf {
    shelf_with(viewer, merger, fast_shelf_options())
}

pub fn shelf_with(viewer: &FakeViewer, merger: Arc<dyn PdfMerger>, options: ShelfOptions) -> Shelf {
    Shelf {
        browser: Arc::new(viewer.clone()),
        merger,
        options,
    }
}

pub fn download_options(concurrency: usize, merge_pdfs: bool) -> DownloadOptions {
    DownloadOptions {
        concurrency,
        merge_pdfs,
        skip_existing: false,
        render: RenderOptions::default(),
        progress_bar: false,
        on_start: None,
        on_progress: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start { done: u32, total: u32 },
    Progress { done: u32, total: u32 },
}

/// Attaches callbacks that append every snapshot to the returned log.
pub fn record_progress(options: DownloadOptions) -> (DownloadOptions, Arc<Mutex<Vec<Event>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (on_start, on_progress) = (Arc::clone(&log), Arc::clone(&log));
    let options = options
        .on_start(move |s| {
            on_start.lock().unwrap().push(Event::Start {
                done: s.downloaded_pages,
                total: s.page_count,
            })
        })
        .on_progress(move |s| {
            on_progress.lock().unwrap().push(Event::Progress {
                done: s.downloaded_pages,
                total: s.page_count,
            })
        });
    (options, log)
}

/// Sorted `page_*.pdf` file names in `dir`.
pub fn page_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|n| n.starts_with("page_") && n.ends_with(".pdf"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub fn expected_page_files(pages: u32) -> Vec<String> {
    (1..=pages).map(|p| format!("page_{p:04}.pdf")).collect()
}

/// Merger that records its calls and writes a marker file instead of a PDF.
#[derive(Default)]
pub struct RecordingMerger {
    calls: Mutex<Vec<(PathBuf, u32)>>,
}

impl RecordingMerger {
    pub fn calls(&self) -> Vec<(PathBuf, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfMerger for RecordingMerger {
    async fn merge(&self, save_dir: &Path, page_count: PageCount) -> Result<PathBuf, MergeError> {
        self.calls
            .lock()
            .unwrap()
            .push((save_dir.to_path_buf(), page_count.get()));
        Ok(merged_pdf_path(save_dir))
    }
}
