//! Viewer Book Downloader 命令行入口。
//!
//! 启动顺序：解析参数 → 初始化日志 → 加载 `config.yml` → 命令行覆盖配置 →
//! 启动浏览器 → 下载 → 关闭浏览器。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use viewer_book_downloader::base_system::book_url::parse_book_url;
use viewer_book_downloader::base_system::config::{ConfigSpec, load_or_create_with_base};
use viewer_book_downloader::base_system::context::Config;
use viewer_book_downloader::base_system::logging::{LogOptions, LogSystem};
use viewer_book_downloader::browser::{ChromiumSession, LaunchOptions};
use viewer_book_downloader::download::{
    DownloadOptions, DownloadReport, DownloadTarget, LopdfMerger, Shelf, ShelfOptions,
    download_book,
};

#[derive(Debug, Parser)]
#[command(name = "viewer-book-downloader")]
#[command(version, about = "Save every page of a web book viewer as PDF")]
struct Cli {
    /// 书籍入口链接（也可以是包含链接的一段文字）
    input: String,

    /// 书名，用作保存目录名；缺省时取链接最后一段
    #[arg(long)]
    title: Option<String>,

    /// 保存目录（覆盖配置中的 save_path）
    #[arg(long)]
    out: Option<PathBuf>,

    /// 同时渲染的页面数（仅直接寻址模式）
    #[arg(long)]
    concurrency: Option<usize>,

    /// 不合并单页 PDF
    #[arg(long, default_value_t = false)]
    no_merge: bool,

    /// 寻址模式：auto / direct / sequential
    #[arg(long)]
    mode: Option<String>,

    /// 跳过已存在的单页 PDF（断点续传）
    #[arg(long, default_value_t = false)]
    skip_existing: bool,

    /// Chrome/Chromium 可执行文件路径
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// 显示浏览器窗口
    #[arg(long, default_value_t = false)]
    headful: bool,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 配置文件路径（默认为数据目录下的 config.yml）
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.as_deref();
    let log = init_logging(cli.debug, data_dir)?;

    let mut config = load_or_create_with_base::<Config>(cli.config.as_deref(), data_dir)
        .map_err(|e| anyhow!(e.to_string()))
        .context("加载配置失败")?;
    apply_overrides(&mut config, &cli)?;

    let url = parse_book_url(&cli.input)
        .ok_or_else(|| anyhow!("未在输入中找到书籍链接: {}", cli.input))?;
    let mut target = DownloadTarget::new(url);
    if let Some(title) = cli.title.as_deref() {
        target = target.with_title(title);
    }

    let launch = LaunchOptions {
        chrome_path: Some(config.chrome_path.trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from),
        headless: config.headless,
        request_timeout: config.timeout() + Duration::from_secs(5),
        ..LaunchOptions::default()
    };
    let browser = Arc::new(
        ChromiumSession::launch(&launch)
            .await
            .context("启动浏览器失败")?,
    );

    let shelf = Shelf {
        browser: browser.clone(),
        merger: Arc::new(LopdfMerger),
        options: ShelfOptions::from_config(&config),
    };
    let options = DownloadOptions {
        progress_bar: true,
        ..DownloadOptions::from_config(&config)
    };

    let out_dir = config.default_save_dir();
    info!(target: "startup", url = %target.url, out = %out_dir.display(), "启动下载任务");
    let interrupted = Arc::new(Notify::new());
    let notify = Arc::clone(&interrupted);
    log.on_interrupt(move || notify.notify_one());

    let result = tokio::select! {
        result = download_book(&shelf, target, &out_dir, options) => Some(result),
        _ = interrupted.notified() => None,
    };
    browser.shutdown().await;

    let Some(result) = result else {
        warn!(target: "startup", "下载被用户中断，已保存的单页保留在磁盘上");
        bail!("下载已中断");
    };
    let report = result.context("下载失败")?;
    print_report(&report);
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(out) = cli.out.as_ref() {
        config.save_path = out.to_string_lossy().to_string();
    }
    if let Some(n) = cli.concurrency {
        config.concurrency = n.max(1);
    }
    if cli.no_merge {
        config.merge_pdfs = false;
    }
    if let Some(mode) = cli.mode.as_ref() {
        config.addressing_mode = mode.clone();
    }
    if cli.skip_existing {
        config.skip_existing_pages = true;
    }
    if let Some(chrome) = cli.chrome.as_ref() {
        config.chrome_path = chrome.to_string_lossy().to_string();
    }
    if cli.headful {
        config.headless = false;
    }

    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("命令行参数无效")?;
    if config.concurrency == 0 {
        warn!(target: "startup", "concurrency 为 0，按 1 处理");
    }
    Ok(())
}

fn print_report(report: &DownloadReport) {
    println!(
        "完成：共 {} 页（新渲染 {}，沿用 {}），寻址模式 {}",
        report.page_count, report.captured, report.skipped, report.mode
    );
    println!("单页目录：{}", report.save_dir.display());
    if let Some(merged) = report.merged.as_ref() {
        println!("合并文件：{}", merged.display());
    }
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
