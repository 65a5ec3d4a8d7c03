//! Reading monitoring documents and shaping them into datasets

pub mod file;
pub mod firestore;
pub mod transform;

use crate::error::SyncResult;
use serde_json::{Map, Value};

pub use file::JsonFileSource;
pub use firestore::FirestoreSource;
pub use transform::Transformer;

/// One server document: its id (the server name) and its fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Anything that yields documents, up to an optional limit
pub trait DocumentSource {
    fn documents(&mut self, limit: Option<usize>) -> SyncResult<Vec<Document>>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}
