//! Viewer Book Downloader：把网页阅读器中的电子书逐页保存为 PDF。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/路径等基础设施
//! - `browser`：浏览器能力抽象与 Chromium 实现
//! - `download`：下载流程编排（页数探测、寻址、渲染、并发、合并）

pub mod base_system;
pub mod browser;
pub mod download;
