use serde::{Deserialize, Serialize};

use crate::attribution::Attribution;

/// A ranked passage returned by the retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub text: String,
    pub document_id: String,
    pub year: i32,
    pub page: u32,
    /// Lexical relevance in `[0.0, 1.0]`, higher is better.
    pub relevance_score: f64,
}

impl Passage {
    pub fn attribution(&self) -> Attribution {
        Attribution::document(self.document_id.clone(), self.year, self.page)
    }
}

/// One page of extracted document text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
}

/// A document ready to be chunked and indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentInput {
    pub document_id: String,
    pub year: i32,
    /// Where the text came from (file name, article URL).
    pub source: String,
    pub pages: Vec<PageText>,
}
