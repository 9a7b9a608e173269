//! Chromium 实现（chromiumoxide / CDP）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserError, BrowserSession, BrowserTab, PdfRenderSpec};

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub request_timeout: Duration,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            request_timeout: Duration::from_secs(60),
            window_width: 1280,
            window_height: 1600,
        }
    }
}

/// A launched Chromium process. Owned by the shelf, never by a download run.
pub struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.window_width, options.window_height)
            .request_timeout(options.request_timeout)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio")
            .arg("--hide-scrollbars");
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = options.chrome_path.as_ref() {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(target: "browser", "handler error: {e}");
                }
            }
        });

        info!(target: "browser", headless = options.headless, "browser launched");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler,
        })
    }

    pub async fn shutdown(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = browser.close().await {
                warn!(target: "browser", "failed to close browser: {e}");
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
        info!(target: "browser", "browser shut down");
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_tab(&self) -> Result<Box<dyn BrowserTab>, BrowserError> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| BrowserError::Protocol("browser already shut down".to_string()))?;
        let page = browser.new_page("about:blank").await.map_err(protocol)?;
        Ok(Box::new(ChromiumTab { page }))
    }
}

pub struct ChromiumTab {
    page: Page,
}

impl ChromiumTab {
    /// Runs `body` as a function body and decodes its JSON-stringified result.
    /// `body` must `return` a value; `undefined` cannot cross the boundary.
    async fn eval_json<T: DeserializeOwned>(&self, body: String) -> Result<T, BrowserError> {
        let expression = format!("JSON.stringify((function() {{ {body} }})())");
        let result = self
            .page
            .evaluate_expression(EvaluateParams::new(expression))
            .await
            .map_err(protocol)?;
        let raw: String = result
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| BrowserError::Script(e.to_string()))
    }
}

#[async_trait]
impl BrowserTab for ChromiumTab {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BrowserError::Timeout {
                what: format!("navigation to {url}"),
                after: timeout,
            }),
        }
    }

    async fn text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        self.eval_json(format!(
            "const el = document.querySelector({}); return el ? el.innerText : null;",
            js_str(selector)
        ))
        .await
    }

    async fn property(&self, selector: &str, name: &str) -> Result<Option<String>, BrowserError> {
        self.eval_json(format!(
            "const el = document.querySelector({}); if (!el) return null; \
             const v = el[{}]; return v == null ? null : String(v);",
            js_str(selector),
            js_str(name)
        ))
        .await
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        self.eval_json(format!(
            "return document.querySelector({}) !== null;",
            js_str(selector)
        ))
        .await
    }

    async fn click(&self, selector: &str) -> Result<bool, BrowserError> {
        if !self.exists(selector).await? {
            return Ok(false);
        }
        let element = self.page.find_element(selector).await.map_err(protocol)?;
        element.click().await.map_err(protocol)?;
        Ok(true)
    }

    async fn type_and_submit(&self, selector: &str, text: &str) -> Result<bool, BrowserError> {
        let cleared: bool = self
            .eval_json(format!(
                "const el = document.querySelector({}); if (!el) return false; \
                 el.value = ''; el.focus(); return true;",
                js_str(selector)
            ))
            .await?;
        if !cleared {
            return Ok(false);
        }
        let element = self.page.find_element(selector).await.map_err(protocol)?;
        element.type_str(text).await.map_err(protocol)?;
        element.press_key("Enter").await.map_err(protocol)?;
        Ok(true)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        self.eval_json(format!("return ({expression});")).await
    }

    async fn print_pdf(&self, path: &Path, spec: &PdfRenderSpec) -> Result<(), BrowserError> {
        let params = PrintToPdfParams::builder()
            .paper_width(spec.paper_width)
            .paper_height(spec.paper_height)
            .margin_top(spec.margin)
            .margin_bottom(spec.margin)
            .margin_left(spec.margin)
            .margin_right(spec.margin)
            .scale(spec.scale)
            .landscape(spec.landscape)
            .print_background(spec.print_background)
            .build();
        let bytes = self.page.pdf(params).await.map_err(protocol)?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|source| BrowserError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page.clone().close().await.map_err(protocol)
    }
}

fn protocol(err: chromiumoxide::error::CdpError) -> BrowserError {
    BrowserError::Protocol(err.to_string())
}

/// Quotes `s` as a JS string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
