//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（DownloadTarget / Shelf / PageCount / ProgressSnapshot 等）
//! - `error`：下载流程错误类型
//! - `pagination`：总页数探测
//! - `locator`：寻址模式探测、直接寻址与顺序翻页
//! - `capture`：单页渲染为 PDF
//! - `pool`：并发抓取调度
//! - `progress`：进度上报与 CLI 进度条
//! - `merge`：单页 PDF 合并
//! - `downloader`：下载主流程编排

pub mod capture;
pub mod downloader;
pub mod error;
pub mod locator;
pub mod merge;
pub mod models;
pub mod pagination;
pub mod pool;
pub(crate) mod progress;

pub use downloader::{BookDownloader, download_book};
pub use error::{Control, ScrapeError};
pub use merge::{LopdfMerger, MergeError, PdfMerger};
pub use models::{
    AddressingMode, AddressingPreference, DownloadOptions, DownloadReport, DownloadTarget,
    PageCount, ProgressSnapshot, RenderOptions, Shelf, ShelfOptions,
};
