//! 进度上报与 CLI 进度条管理。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::{PageCount, ProgressCallback, ProgressHooks, ProgressSnapshot};

/// Owns the progress counter for one run.
///
/// Lives on the task that drives the run, so snapshots are emitted in the
/// order completions are observed and `downloaded_pages` never decreases.
pub(crate) struct ProgressReporter {
    snapshot: ProgressSnapshot,
    on_start: Option<ProgressCallback>,
    on_progress: Option<ProgressCallback>,
    bar: Option<ProgressBar>,
    started: bool,
}

impl ProgressReporter {
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Fires `on_start` once; later calls are ignored.
    pub(crate) fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        if let Some(cb) = self.on_start.as_mut() {
            cb(&self.snapshot);
        }
    }

    pub(crate) fn page_done(&mut self) {
        let total = self.snapshot.page_count;
        self.snapshot.downloaded_pages = (self.snapshot.downloaded_pages + 1).min(total);
        self.snapshot.percentage = fraction(self.snapshot.downloaded_pages, total);
        if let Some(bar) = self.bar.as_ref() {
            bar.set_position(self.snapshot.downloaded_pages as u64);
        }
        if let Some(cb) = self.on_progress.as_mut() {
            cb(&self.snapshot);
        }
    }

    pub(crate) fn finish(&mut self) {
        let Some(bar) = self.bar.take() else {
            return;
        };
        if self.snapshot.downloaded_pages >= self.snapshot.page_count {
            bar.finish();
        } else {
            bar.abandon();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

fn fraction(done: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(done) / f64::from(total)
}

// ── 构造函数 ──────────────────────────────────────────────────

pub(crate) fn make_reporter(
    target: &str,
    count: PageCount,
    progress_bar: bool,
    hooks: ProgressHooks,
) -> ProgressReporter {
    let bar = progress_bar.then(|| {
        let bar = ProgressBar::with_draw_target(
            Some(count.get() as u64),
            ProgressDrawTarget::stderr(),
        );
        let style = ProgressStyle::with_template(
            "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix("页面下载");
        bar
    });

    ProgressReporter {
        snapshot: ProgressSnapshot {
            target: target.to_string(),
            downloaded_pages: 0,
            page_count: count.get(),
            percentage: 0.0,
        },
        on_start: hooks.on_start,
        on_progress: hooks.on_progress,
        bar,
        started: false,
    }
}
