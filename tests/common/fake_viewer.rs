use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{Document, Object, Stream, dictionary};
use serde_json::{Value, json};

use viewer_book_downloader::base_system::context::ViewerSelectors;
use viewer_book_downloader::browser::{BrowserError, BrowserSession, BrowserTab, PdfRenderSpec};

pub const ENTRY_URL: &str = "https://shop.test/books/42";
pub const FRAME_URL: &str = "https://viewer.test/frame/42";

/// Natural size of every fake page image, in CSS pixels.
pub const IMAGE_SIZE: (u32, u32) = (960, 1344);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerKind {
    /// Go-to form and stable per-page image URLs.
    Direct,
    /// Next/first buttons and per-session image tokens.
    Sequential,
    /// Neither navigation control.
    Bare,
}

#[derive(Debug, Clone)]
pub struct ViewerScript {
    pub kind: ViewerKind,
    pub pages: u32,
    pub has_frame: bool,
    /// Frame element present but without a usable `src`.
    pub empty_frame_src: bool,
    /// Successive reads of the page counter; the last value repeats.
    pub counter: Vec<Option<String>>,
    pub missing_next_at: Option<u32>,
    /// Page whose image never appears.
    pub missing_image_at: Option<u32>,
    /// Page at which the connection drops while the image is awaited.
    pub lost_connection_at: Option<u32>,
    pub has_page_input: bool,
    pub fail_render_at: Option<u32>,
    /// Time `print_pdf` takes, so overlapping captures can be observed.
    pub render_delay: Duration,
}

impl ViewerScript {
    pub fn direct(pages: u32) -> Self {
        Self::new(ViewerKind::Direct, pages)
    }

    pub fn sequential(pages: u32) -> Self {
        Self::new(ViewerKind::Sequential, pages)
    }

    pub fn bare(pages: u32) -> Self {
        Self::new(ViewerKind::Bare, pages)
    }

    fn new(kind: ViewerKind, pages: u32) -> Self {
        Self {
            kind,
            pages,
            has_frame: true,
            empty_frame_src: false,
            counter: vec![Some(pages.to_string())],
            missing_next_at: None,
            missing_image_at: None,
            lost_connection_at: None,
            has_page_input: true,
            fail_render_at: None,
            render_delay: Duration::from_millis(3),
        }
    }

    pub fn with_counter(mut self, reads: &[Option<&str>]) -> Self {
        self.counter = reads.iter().map(|r| r.map(str::to_string)).collect();
        self
    }

    pub fn without_frame(mut self) -> Self {
        self.has_frame = false;
        self
    }

    pub fn with_empty_frame_src(mut self) -> Self {
        self.empty_frame_src = true;
        self
    }

    pub fn missing_next_at(mut self, page: u32) -> Self {
        self.missing_next_at = Some(page);
        self
    }

    pub fn missing_image_at(mut self, page: u32) -> Self {
        self.missing_image_at = Some(page);
        self
    }

    pub fn lost_connection_at(mut self, page: u32) -> Self {
        self.lost_connection_at = Some(page);
        self
    }

    pub fn without_page_input(mut self) -> Self {
        self.has_page_input = false;
        self
    }

    pub fn fail_render_at(mut self, page: u32) -> Self {
        self.fail_render_at = Some(page);
        self
    }

    fn image_address(&self, page: u32) -> String {
        match self.kind {
            ViewerKind::Sequential => {
                format!("https://cdn.viewer.test/session/t{:x}9/page-{page}.jpg", page * 7919)
            }
            _ => format!("https://cdn.viewer.test/book/page-{page}.jpg"),
        }
    }
}

fn page_of(address: &str) -> Option<u32> {
    address
        .strip_suffix(".jpg")?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}

struct Inner {
    script: ViewerScript,
    selectors: ViewerSelectors,
    counter: Mutex<VecDeque<Option<String>>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    active_captures: AtomicUsize,
    peak_captures: AtomicUsize,
    printed: Mutex<Vec<(u32, PdfRenderSpec)>>,
}

/// A scripted book viewer standing in for a real browser.
#[derive(Clone)]
pub struct FakeViewer {
    inner: Arc<Inner>,
}

impl FakeViewer {
    pub fn new(script: ViewerScript) -> Self {
        let counter = script.counter.iter().cloned().collect();
        Self {
            inner: Arc::new(Inner {
                script,
                selectors: ViewerSelectors::default(),
                counter: Mutex::new(counter),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                active_captures: AtomicUsize::new(0),
                peak_captures: AtomicUsize::new(0),
                printed: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn tabs_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn tabs_closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn peak_captures(&self) -> usize {
        self.inner.peak_captures.load(Ordering::SeqCst)
    }

    /// Page numbers in the order they were printed.
    pub fn printed_pages(&self) -> Vec<u32> {
        self.inner.printed.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }

    pub fn render_specs(&self) -> Vec<PdfRenderSpec> {
        self.inner.printed.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }
}

#[async_trait]
impl BrowserSession for FakeViewer {
    async fn new_tab(&self) -> Result<Box<dyn BrowserTab>, BrowserError> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTab {
            viewer: Arc::clone(&self.inner),
            url: Mutex::new("about:blank".to_string()),
            current_page: AtomicU32::new(1),
            capture: AtomicBool::new(false),
        }))
    }
}

struct FakeTab {
    viewer: Arc<Inner>,
    url: Mutex<String>,
    current_page: AtomicU32,
    capture: AtomicBool,
}

impl FakeTab {
    fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    fn on_entry(&self) -> bool {
        self.url() == ENTRY_URL && self.viewer.script.has_frame
    }

    fn on_frame(&self) -> bool {
        let url = self.url();
        url == FRAME_URL || (url == ENTRY_URL && !self.viewer.script.has_frame)
    }

    fn page(&self) -> u32 {
        self.current_page.load(Ordering::SeqCst)
    }

    fn frame_has(&self, selector: &str) -> bool {
        let script = &self.viewer.script;
        let sel = &self.viewer.selectors;
        if selector == sel.total_pages {
            return true;
        }
        if selector == sel.page_image {
            return script.missing_image_at != Some(self.page());
        }
        match script.kind {
            ViewerKind::Direct => {
                selector == sel.go_page_form
                    || (selector == sel.current_page_input && script.has_page_input)
            }
            ViewerKind::Sequential => {
                selector == sel.first_page
                    || (selector == sel.next_page
                        && script.missing_next_at != Some(self.page()))
            }
            ViewerKind::Bare => false,
        }
    }
}

#[async_trait]
impl BrowserTab for FakeTab {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        *self.url.lock().unwrap() = url.to_string();
        if page_of(url).is_some() && !self.capture.swap(true, Ordering::SeqCst) {
            let active = self.viewer.active_captures.fetch_add(1, Ordering::SeqCst) + 1;
            self.viewer.peak_captures.fetch_max(active, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        if !self.on_frame() || selector != self.viewer.selectors.total_pages {
            return Ok(None);
        }
        let mut reads = self.viewer.counter.lock().unwrap();
        let value = if reads.len() > 1 {
            reads.pop_front().flatten()
        } else {
            reads.front().cloned().flatten()
        };
        Ok(value)
    }

    async fn property(&self, selector: &str, name: &str) -> Result<Option<String>, BrowserError> {
        if name != "src" {
            return Ok(None);
        }
        let sel = &self.viewer.selectors;
        if self.on_entry() && selector == sel.book_frame {
            return Ok(Some(if self.viewer.script.empty_frame_src {
                String::new()
            } else {
                FRAME_URL.to_string()
            }));
        }
        if self.on_frame() && selector == sel.page_image && self.frame_has(selector) {
            return Ok(Some(self.viewer.script.image_address(self.page())));
        }
        Ok(None)
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        if self.on_entry() {
            return Ok(selector == self.viewer.selectors.book_frame);
        }
        if self.on_frame()
            && selector == self.viewer.selectors.page_image
            && self.viewer.script.lost_connection_at == Some(self.page())
        {
            return Err(BrowserError::Protocol("websocket closed".into()));
        }
        Ok(self.on_frame() && self.frame_has(selector))
    }

    async fn click(&self, selector: &str) -> Result<bool, BrowserError> {
        if !self.on_frame() || !self.frame_has(selector) {
            return Ok(false);
        }
        let sel = &self.viewer.selectors;
        if selector == sel.next_page {
            let next = (self.page() + 1).min(self.viewer.script.pages);
            self.current_page.store(next, Ordering::SeqCst);
        } else if selector == sel.first_page {
            self.current_page.store(1, Ordering::SeqCst);
        }
        Ok(true)
    }

    async fn type_and_submit(&self, selector: &str, text: &str) -> Result<bool, BrowserError> {
        if !self.on_frame()
            || self.viewer.script.kind != ViewerKind::Direct
            || !self.frame_has(selector)
            || selector != self.viewer.selectors.current_page_input
        {
            return Ok(false);
        }
        if let Ok(page) = text.parse::<u32>()
            && (1..=self.viewer.script.pages).contains(&page)
        {
            self.current_page.store(page, Ordering::SeqCst);
        }
        Ok(true)
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value, BrowserError> {
        if self.capture.load(Ordering::SeqCst) {
            Ok(json!({ "width": IMAGE_SIZE.0, "height": IMAGE_SIZE.1 }))
        } else {
            Ok(Value::Null)
        }
    }

    async fn print_pdf(&self, path: &Path, spec: &PdfRenderSpec) -> Result<(), BrowserError> {
        let page = page_of(&self.url())
            .ok_or_else(|| BrowserError::Protocol("print requested off a page image".into()))?;
        tokio::time::sleep(self.viewer.script.render_delay).await;
        if self.viewer.script.fail_render_at == Some(page) {
            return Err(BrowserError::Protocol(format!("printToPDF failed for page {page}")));
        }
        write_single_page_pdf(path, page).map_err(|source| BrowserError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.viewer.printed.lock().unwrap().push((page, *spec));
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.viewer.closed.fetch_add(1, Ordering::SeqCst);
        if self.capture.swap(false, Ordering::SeqCst) {
            self.viewer.active_captures.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// One-page PDF whose MediaBox width encodes the page number.
fn write_single_page_pdf(path: &Path, page: u32) -> std::io::Result<()> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), (100 + i64::from(page)).into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).map(|_| ())
}

