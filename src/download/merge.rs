//! 单页 PDF 合并。

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lopdf::{Document, Object, ObjectId};
use thiserror::Error;
use tracing::info;

use super::models::PageCount;
use crate::base_system::book_paths::{merged_pdf_path, page_pdf_path};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("page file missing: {0}")]
    MissingPage(PathBuf),
    #[error("failed to read {path}: {source}")]
    Load { path: PathBuf, source: lopdf::Error },
    #[error("{0} has no page tree")]
    NoPageTree(PathBuf),
    #[error("failed to write merged pdf {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("merge task panicked: {0}")]
    Join(String),
}

/// Concatenates the per-page PDFs of a finished run into one document.
#[async_trait]
pub trait PdfMerger: Send + Sync {
    async fn merge(&self, save_dir: &Path, page_count: PageCount) -> Result<PathBuf, MergeError>;
}

/// `lopdf`-based merger; writes `<folder>.pdf` into the save directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfMerger;

#[async_trait]
impl PdfMerger for LopdfMerger {
    async fn merge(&self, save_dir: &Path, page_count: PageCount) -> Result<PathBuf, MergeError> {
        let save_dir = save_dir.to_path_buf();
        tokio::task::spawn_blocking(move || merge_sync(&save_dir, page_count))
            .await
            .map_err(|e| MergeError::Join(e.to_string()))?
    }
}

fn merge_sync(save_dir: &Path, page_count: PageCount) -> Result<PathBuf, MergeError> {
    let mut documents = Vec::with_capacity(page_count.get() as usize);
    for page_no in page_count.pages() {
        let path = page_pdf_path(save_dir, page_no);
        if !path.exists() {
            return Err(MergeError::MissingPage(path));
        }
        let doc = Document::load(&path).map_err(|source| MergeError::Load {
            path: path.clone(),
            source,
        })?;
        documents.push((path, doc));
    }

    let mut merged = concat_documents(documents)?;
    let out = merged_pdf_path(save_dir);
    write_atomic(&mut merged, &out)?;
    info!(target: "merge", pages = page_count.get(), path = %out.display(), "merged pdf written");
    Ok(out)
}

/// Appends every page of every document, in order, under one page tree.
fn concat_documents(documents: Vec<(PathBuf, Document)>) -> Result<Document, MergeError> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut page_tree: Option<(ObjectId, Object)> = None;

    for (path, mut doc) in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, page_id) in doc.get_pages() {
            if let Ok(page) = doc.get_object(page_id) {
                pages.push((page_id, page.to_owned()));
            }
        }

        let mut found_tree = false;
        for (id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" => {
                    if catalog.is_none() {
                        catalog = Some((id, object));
                    }
                }
                b"Pages" => {
                    found_tree = true;
                    if page_tree.is_none() {
                        page_tree = Some((id, object));
                    }
                }
                b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    objects.insert(id, object);
                }
            }
        }
        if !found_tree {
            return Err(MergeError::NoPageTree(path));
        }
    }

    let (Some((catalog_id, catalog)), Some((tree_id, tree))) = (catalog, page_tree) else {
        return Err(MergeError::NoPageTree(PathBuf::new()));
    };

    let mut out = Document::with_version("1.5");
    out.objects = objects;

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    for (id, page) in pages.iter() {
        if let Ok(dict) = page.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", tree_id);
            out.objects.insert(*id, Object::Dictionary(dict));
        }
    }

    if let Ok(dict) = tree.as_dict() {
        let mut dict = dict.clone();
        dict.set("Count", pages.len() as i64);
        dict.set("Kids", kids);
        out.objects.insert(tree_id, Object::Dictionary(dict));
    }

    if let Ok(dict) = catalog.as_dict() {
        let mut dict = dict.clone();
        dict.set("Pages", tree_id);
        dict.remove(b"Outlines");
        out.objects.insert(catalog_id, Object::Dictionary(dict));
    }

    out.trailer.set("Root", catalog_id);
    out.max_id = out.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
    out.renumber_objects();
    out.adjust_zero_pages();
    out.compress();
    Ok(out)
}

fn write_atomic(doc: &mut Document, out: &Path) -> Result<(), MergeError> {
    let write_err = |source: std::io::Error| MergeError::Write {
        path: out.to_path_buf(),
        source,
    };
    let dir = out.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    doc.save_to(tmp.as_file_mut()).map_err(write_err)?;
    tmp.as_file_mut().flush().map_err(write_err)?;
    tmp.persist(out).map_err(|e| write_err(e.error))?;
    Ok(())
}
