use std::path::Path;

use filings_models::{DocumentInput, PageText};
use tracing::debug;

use crate::error::RetrievalError;

/// Page separator emitted by `pdftotext`.
const PAGE_BREAK: char = '\x0c';

/// Read a pre-extracted text document from `dir`.
///
/// `file` must be a bare file name; path separators and `..` are rejected so
/// callers (including the model) cannot read outside the documents directory.
/// Pages are split on form feeds and numbered from 1; blank pages keep their
/// number but produce no text. The document id defaults to the file stem and
/// the year to the first 19xx/20xx number in it.
pub fn load_text_document(
    dir: &Path,
    file: &str,
    document_id: Option<&str>,
    year: Option<i32>,
) -> Result<DocumentInput, RetrievalError> {
    let file = file.trim();
    if file.is_empty() || file.contains(['/', '\\']) || file.contains("..") {
        return Err(RetrievalError::InvalidDocument(format!(
            "'{file}' is not a plain file name"
        )));
    }

    let path = dir.join(file);
    if !path.is_file() {
        return Err(RetrievalError::InvalidDocument(format!(
            "'{file}' not found in {}",
            dir.display()
        )));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file)
        .to_string();
    let document_id = document_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| stem.clone());
    let year = year.or_else(|| year_in(&stem)).ok_or_else(|| {
        RetrievalError::InvalidDocument(format!("no year given and none found in '{stem}'"))
    })?;

    let raw = std::fs::read_to_string(&path)?;
    let pages = split_pages(&raw);
    debug!(document_id = %document_id, year, pages = pages.len(), "loaded text document");

    Ok(DocumentInput {
        document_id,
        year,
        source: file.to_string(),
        pages,
    })
}

/// Names of the `.txt` files directly inside `dir`, sorted.
pub fn list_text_documents(dir: &Path) -> Result<Vec<String>, RetrievalError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn split_pages(raw: &str) -> Vec<PageText> {
    raw.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| PageText {
            page: i as u32 + 1,
            text: text.trim().to_string(),
        })
        .collect()
}

/// First standalone 4-digit number between 1900 and 2099.
pub fn year_in(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4)
        .filter_map(|run| run.parse::<i32>().ok())
        .find(|y| (1900..=2099).contains(y))
}
