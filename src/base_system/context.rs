//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 保存配置
    #[serde(default)]
    pub save_path: String,
    #[serde(default = "default_true")]
    pub merge_pdfs: bool,
    #[serde(default = "default_false")]
    pub skip_existing_pages: bool,

    // 并发与超时
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_addressing_mode")]
    pub addressing_mode: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub pagination_max_wait_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_readiness_poll_ms")]
    pub readiness_poll_ms: u64,

    // 渲染配置
    #[serde(default = "default_true")]
    pub fit_page_to_content: bool,
    #[serde(default = "default_true")]
    pub print_background: bool,
    #[serde(default = "default_false")]
    pub landscape: bool,
    #[serde(default = "default_render_scale")]
    pub render_scale: f64,
    #[serde(default)]
    pub page_margin_in: f64,
    #[serde(default)]
    pub paper_width_in: f64,
    #[serde(default)]
    pub paper_height_in: f64,

    // 浏览器配置
    #[serde(default)]
    pub chrome_path: String,
    #[serde(default = "default_true")]
    pub headless: bool,

    // 阅读器页面选择器
    #[serde(default)]
    pub selectors: ViewerSelectors,
}

/// CSS selectors for the controls the viewer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerSelectors {
    #[serde(default = "default_book_frame")]
    pub book_frame: String,
    #[serde(default = "default_total_pages")]
    pub total_pages: String,
    #[serde(default = "default_go_page_form")]
    pub go_page_form: String,
    #[serde(default = "default_current_page_input")]
    pub current_page_input: String,
    #[serde(default = "default_page_image")]
    pub page_image: String,
    #[serde(default = "default_next_page")]
    pub next_page: String,
    /// Empty disables the jump-to-first step.
    #[serde(default = "default_first_page")]
    pub first_page: String,
}

impl Default for ViewerSelectors {
    fn default() -> Self {
        Self {
            book_frame: default_book_frame(),
            total_pages: default_total_pages(),
            go_page_form: default_go_page_form(),
            current_page_input: default_current_page_input(),
            page_image: default_page_image(),
            next_page: default_next_page(),
            first_page: default_first_page(),
        }
    }
}

impl ViewerSelectors {
    pub fn first_page(&self) -> Option<&str> {
        let s = self.first_page.trim();
        (!s.is_empty()).then_some(s)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            merge_pdfs: default_true(),
            skip_existing_pages: default_false(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            addressing_mode: default_addressing_mode(),
            poll_interval_ms: default_poll_interval_ms(),
            pagination_max_wait_secs: 0,
            settle_delay_ms: default_settle_delay_ms(),
            readiness_poll_ms: default_readiness_poll_ms(),
            fit_page_to_content: default_true(),
            print_background: default_true(),
            landscape: default_false(),
            render_scale: default_render_scale(),
            page_margin_in: 0.0,
            paper_width_in: 0.0,
            paper_height_in: 0.0,
            chrome_path: String::new(),
            headless: default_true(),
            selectors: ViewerSelectors::default(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn validate(&self) -> Result<(), String> {
        let mode = self.addressing_mode.trim().to_ascii_lowercase();
        if !matches!(mode.as_str(), "" | "auto" | "direct" | "sequential") {
            return Err(format!(
                "addressing_mode `{}` is not one of auto, direct, sequential",
                self.addressing_mode
            ));
        }
        if self.paper_width_in < 0.0 || self.paper_height_in < 0.0 || self.page_margin_in < 0.0 {
            return Err("paper size and margin must not be negative".to_string());
        }
        let sel = &self.selectors;
        if sel.page_image.trim().is_empty() || sel.total_pages.trim().is_empty() {
            return Err("selectors.page_image and selectors.total_pages are required".to_string());
        }
        Ok(())
    }

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 20] = [
            FieldMeta {
                name: "save_path",
                description: "保存路径（留空为当前目录）",
            },
            FieldMeta {
                name: "merge_pdfs",
                description: "下载完成后是否合并为单个 PDF",
            },
            FieldMeta {
                name: "skip_existing_pages",
                description: "跳过已存在的单页 PDF（断点续传）",
            },
            FieldMeta {
                name: "concurrency",
                description: "同时打开的最大标签页数（仅直接寻址模式）",
            },
            FieldMeta {
                name: "timeout_secs",
                description: "页面导航与元素等待的超时时间（秒）",
            },
            FieldMeta {
                name: "addressing_mode",
                description: "页面寻址方式, 可选: [auto, direct, sequential]",
            },
            FieldMeta {
                name: "poll_interval_ms",
                description: "读取总页数失败时的重试间隔, 单位ms",
            },
            FieldMeta {
                name: "pagination_max_wait_secs",
                description: "读取总页数的最长等待时间（秒，0 表示无限等待）",
            },
            FieldMeta {
                name: "settle_delay_ms",
                description: "翻页后等待页面稳定的最长时间, 单位ms",
            },
            FieldMeta {
                name: "readiness_poll_ms",
                description: "翻页后检测页面图片变化的间隔, 单位ms",
            },
            FieldMeta {
                name: "fit_page_to_content",
                description: "按页面图片尺寸设置 PDF 纸张大小",
            },
            FieldMeta {
                name: "print_background",
                description: "渲染 PDF 时是否包含背景",
            },
            FieldMeta {
                name: "landscape",
                description: "是否横向渲染",
            },
            FieldMeta {
                name: "render_scale",
                description: "渲染缩放比例 (0.1-2.0)",
            },
            FieldMeta {
                name: "page_margin_in",
                description: "页边距（英寸）",
            },
            FieldMeta {
                name: "paper_width_in",
                description: "固定纸张宽度（英寸，0 表示自动）",
            },
            FieldMeta {
                name: "paper_height_in",
                description: "固定纸张高度（英寸，0 表示自动）",
            },
            FieldMeta {
                name: "chrome_path",
                description: "Chrome/Chromium 可执行文件路径（留空自动检测）",
            },
            FieldMeta {
                name: "headless",
                description: "是否以无头模式运行浏览器",
            },
            FieldMeta {
                name: "selectors",
                description: "阅读器页面元素的 CSS 选择器",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    /// `None` keeps polling the page counter forever.
    pub fn pagination_max_wait(&self) -> Option<Duration> {
        (self.pagination_max_wait_secs > 0)
            .then(|| Duration::from_secs(self.pagination_max_wait_secs))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms.max(10))
    }
}

pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            ':' | '"' | '<' | '>' | '/' | '\\' | '|' | '?' | '*' => fallback,
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    if cleaned.is_empty() {
        cleaned.push_str("unnamed");
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断导致 panic
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
        if cleaned.is_empty() {
            cleaned.push_str("unnamed");
        }
    }

    cleaned
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_addressing_mode() -> String {
    "auto".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    1500
}

fn default_readiness_poll_ms() -> u64 {
    100
}

fn default_render_scale() -> f64 {
    1.0
}

fn default_book_frame() -> String {
    ".book-frame".to_string()
}

fn default_total_pages() -> String {
    "#total-pages".to_string()
}

fn default_go_page_form() -> String {
    "form.go-page".to_string()
}

fn default_current_page_input() -> String {
    "input.current-page".to_string()
}

fn default_page_image() -> String {
    ".image-div > img".to_string()
}

fn default_next_page() -> String {
    ".next-page".to_string()
}

fn default_first_page() -> String {
    ".first-page".to_string()
}
