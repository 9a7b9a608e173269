use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::base_system::book_url::book_slug;
use crate::base_system::context::safe_fs_name;

pub fn book_folder_name(url: &str, title: Option<&str>) -> String {
    let title = title.map(str::trim).filter(|t| !t.is_empty());
    match title {
        Some(t) => safe_fs_name(t, "_", 120),
        None => safe_fs_name(&book_slug(url), "_", 120),
    }
}

/// Creates `out_dir/<folder>` and returns it.
pub fn ensure_book_dir(out_dir: &Path, url: &str, title: Option<&str>) -> io::Result<PathBuf> {
    let dir = out_dir.join(book_folder_name(url, title));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Per-page artifact path; `page_no` is 1-based.
pub fn page_pdf_path(save_dir: &Path, page_no: u32) -> PathBuf {
    save_dir.join(format!("page_{page_no:04}.pdf"))
}

pub fn merged_pdf_path(save_dir: &Path) -> PathBuf {
    let stem = save_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "book".to_string());
    save_dir.join(format!("{stem}.pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefers_title_over_url() {
        assert_eq!(
            book_folder_name("https://viewer.test/book/42", Some("Deutsch 7: Arbeitsheft")),
            "Deutsch 7_ Arbeitsheft"
        );
        assert_eq!(book_folder_name("https://viewer.test/book/42", Some("  ")), "42");
        assert_eq!(book_folder_name("https://viewer.test/book/42", None), "42");
    }

    #[test]
    fn page_paths_sort_in_page_order() {
        let dir = Path::new("/out/42");
        assert_eq!(page_pdf_path(dir, 7), PathBuf::from("/out/42/page_0007.pdf"));
        assert!(page_pdf_path(dir, 9) < page_pdf_path(dir, 10));
    }

    #[test]
    fn merged_file_is_named_after_folder() {
        assert_eq!(
            merged_pdf_path(Path::new("/out/42")),
            PathBuf::from("/out/42/42.pdf")
        );
    }
}
