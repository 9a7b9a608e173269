//! 下载流程错误类型。

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::merge::MergeError;
use crate::browser::BrowserError;

/// A viewer control the engine requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    BookFrame,
    GoPageForm,
    CurrentPageInput,
    PageImage,
    NextButton,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Control::BookFrame => "book frame",
            Control::GoPageForm => "go-page form",
            Control::CurrentPageInput => "current page input",
            Control::PageImage => "page image",
            Control::NextButton => "next page button",
        })
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("could not locate the viewer's {control}{}", at_page(.page))]
    MissingControl { control: Control, page: Option<u32> },
    #[error("page counter did not show a page count within {0:?}")]
    PaginationTimeout(Duration),
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl ScrapeError {
    pub(crate) fn missing(control: Control) -> Self {
        ScrapeError::MissingControl {
            control,
            page: None,
        }
    }

    pub(crate) fn missing_at(control: Control, page: u32) -> Self {
        ScrapeError::MissingControl {
            control,
            page: Some(page),
        }
    }
}

fn at_page(page: &Option<u32>) -> String {
    page.map(|p| format!(" at page {p}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_control_message_names_control_and_page() {
        let err = ScrapeError::missing_at(Control::NextButton, 3);
        assert_eq!(
            err.to_string(),
            "could not locate the viewer's next page button at page 3"
        );
        let err = ScrapeError::missing(Control::GoPageForm);
        assert_eq!(err.to_string(), "could not locate the viewer's go-page form");
    }
}
