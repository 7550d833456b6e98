pub mod chunker;
pub mod error;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod scoring;
pub mod service;
pub mod store;

pub use error::RetrievalError;
pub use index::PassageIndex;
pub use ingest::{list_text_documents, load_text_document};
pub use service::RetrievalService;
pub use store::PassageStore;
