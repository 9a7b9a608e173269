//! 单页渲染：打开标签页、加载页面图片、打印为 PDF。

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::error::ScrapeError;
use super::models::{RenderOptions, Shelf};
use crate::base_system::book_paths::page_pdf_path;
use crate::browser::{BrowserTab, PdfRenderSpec};

const CSS_PX_PER_INCH: f64 = 96.0;

const MEASURE_CONTENT: &str = "(() => { \
    const img = document.images[0]; \
    if (img && img.naturalWidth > 0) return { width: img.naturalWidth, height: img.naturalHeight }; \
    const d = document.documentElement; \
    return { width: d.scrollWidth, height: d.scrollHeight }; \
})()";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Rendered,
    /// The page PDF already existed on disk and was kept.
    Kept,
}

/// Renders one page address to `page_{NNNN}.pdf` in `save_dir`.
///
/// Opens its own tab and closes it on every path. The PDF is written under
/// a temporary name and renamed into place, so an existing artifact is
/// always complete.
pub async fn capture_page(
    shelf: &Shelf,
    address: &str,
    save_dir: &Path,
    page_no: u32,
    render: &RenderOptions,
    skip_existing: bool,
) -> Result<CaptureOutcome, ScrapeError> {
    let path = page_pdf_path(save_dir, page_no);
    if skip_existing && already_saved(&path).await? {
        debug!(target: "download", page_no, "page already saved, skipping");
        return Ok(CaptureOutcome::Kept);
    }

    let tab = shelf.browser.new_tab().await?;
    let result = render_into(tab.as_ref(), shelf, address, &path, render).await;
    close_after(tab.as_ref(), result).await?;

    debug!(target: "download", page_no, path = %path.display(), "page saved");
    Ok(CaptureOutcome::Rendered)
}

async fn render_into(
    tab: &dyn BrowserTab,
    shelf: &Shelf,
    address: &str,
    path: &Path,
    render: &RenderOptions,
) -> Result<(), ScrapeError> {
    tab.goto(address, shelf.options.timeout).await?;
    let spec = resolve_render_spec(tab, render).await?;

    let partial = partial_path(path);
    tab.print_pdf(&partial, &spec).await?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|source| ScrapeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn already_saved(path: &Path) -> Result<bool, ScrapeError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|source| ScrapeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Closes `tab`, then hands back `result`.
///
/// A close failure is only reported when the work itself succeeded;
/// otherwise the original error wins.
pub(crate) async fn close_after<T>(
    tab: &dyn BrowserTab,
    result: Result<T, ScrapeError>,
) -> Result<T, ScrapeError> {
    match (tab.close().await, result) {
        (Ok(()), result) => result,
        (Err(close_err), Ok(_)) => Err(close_err.into()),
        (Err(close_err), Err(err)) => {
            warn!(target: "browser", "failed to close tab: {close_err}");
            Err(err)
        }
    }
}

/// Fixed paper size when configured, otherwise the page content's size.
pub(crate) async fn resolve_render_spec(
    tab: &dyn BrowserTab,
    render: &RenderOptions,
) -> Result<PdfRenderSpec, ScrapeError> {
    let base = PdfRenderSpec {
        margin: render.margin,
        scale: render.scale,
        landscape: render.landscape,
        print_background: render.print_background,
        ..PdfRenderSpec::default()
    };

    let measured = match (render.paper_width, render.paper_height) {
        (Some(_), Some(_)) => None,
        _ if render.fit_to_content => {
            let value = tab.evaluate(MEASURE_CONTENT).await?;
            let size = content_size_inches(&value);
            if size.is_none() {
                warn!(target: "download", %value, "could not measure page content, using default paper size");
            }
            size
        }
        _ => None,
    };

    let (fit_w, fit_h) = match measured {
        Some((w, h)) => (w + 2.0 * render.margin, h + 2.0 * render.margin),
        None => (base.paper_width, base.paper_height),
    };
    Ok(PdfRenderSpec {
        paper_width: render.paper_width.unwrap_or(fit_w),
        paper_height: render.paper_height.unwrap_or(fit_h),
        ..base
    })
}

fn content_size_inches(value: &Value) -> Option<(f64, f64)> {
    let w = value.get("width")?.as_f64()?;
    let h = value.get("height")?.as_f64()?;
    (w > 0.0 && h > 0.0).then(|| (w / CSS_PX_PER_INCH, h / CSS_PX_PER_INCH))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
