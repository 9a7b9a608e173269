//! 浏览器能力抽象。
//!
//! The harvesting engine only ever talks to the browser through these two
//! traits: a session that can open tabs, and a tab that can navigate, query
//! the DOM, and print itself to PDF. `chromium` is the real implementation;
//! integration tests drive the engine with a scripted viewer instead.

pub mod chromium;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use chromium::{ChromiumSession, LaunchOptions};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },
    #[error("devtools protocol error: {0}")]
    Protocol(String),
    #[error("unexpected script result: {0}")]
    Script(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Concrete print settings for one page, in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRenderSpec {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin: f64,
    pub scale: f64,
    pub landscape: bool,
    pub print_background: bool,
}

impl Default for PdfRenderSpec {
    fn default() -> Self {
        // A4 portrait
        Self {
            paper_width: 8.27,
            paper_height: 11.69,
            margin: 0.0,
            scale: 1.0,
            landscape: false,
            print_background: true,
        }
    }
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Opens a blank tab. The caller owns it and must `close` it.
    async fn new_tab(&self) -> Result<Box<dyn BrowserTab>, BrowserError>;
}

#[async_trait]
pub trait BrowserTab: Send + Sync {
    /// Navigates and waits for the document to load, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// `innerText` of the first match, `None` when nothing matches.
    async fn text(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// A DOM property (not attribute) of the first match, stringified.
    /// `None` when nothing matches or the property is null.
    async fn property(&self, selector: &str, name: &str) -> Result<Option<String>, BrowserError>;

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Clicks the first match. `Ok(false)` when nothing matches.
    async fn click(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Replaces the value of the first matching input with `text` and presses
    /// Enter. `Ok(false)` when nothing matches.
    async fn type_and_submit(&self, selector: &str, text: &str) -> Result<bool, BrowserError>;

    /// Evaluates a JS expression whose result is JSON-serialisable.
    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError>;

    async fn print_pdf(&self, path: &Path, spec: &PdfRenderSpec) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;

    /// Polls until `selector` matches or `timeout` elapses.
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let poll = Duration::from_millis(100).min(timeout.max(Duration::from_millis(1)));
        let waited = tokio::time::timeout(timeout, async {
            loop {
                if self.exists(selector).await? {
                    return Ok::<(), BrowserError>(());
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await;
        match waited {
            Ok(res) => res,
            Err(_) => Err(BrowserError::Timeout {
                what: format!("selector `{selector}`"),
                after: timeout,
            }),
        }
    }
}
