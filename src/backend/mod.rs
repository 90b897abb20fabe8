//! Client side of the document search backend.
//!
//! The store only talks to the backend through [`SearchBackend`]. All calls
//! are blocking; callers run them off the async runtime.

mod elastic;
mod memory;

pub use elastic::ElasticBackend;
pub use memory::MemoryBackend;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{Error, Result, WriteFailure};
use crate::schema::{CollectionMapping, IndexDefinition};

/// A document read back from the backend with its concurrency version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub version: u64,
    pub source: Value,
}

impl StoredDocument {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.source.clone())
            .map_err(|e| Error::backend("decode document", format!("{}: {e}", self.id)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Exact match against a non-analyzed field.
    Term { field: String, value: Value },
    /// Full-text match through the field's search analyzer.
    Match { field: String, text: String },
    MatchAll,
}

impl Query {
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Query::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn full_text(field: &str, text: impl Into<String>) -> Self {
        Query::Match {
            field: field.to_string(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Query::Term { field, value } => json!({ "term": { field: value } }),
            Query::Match { field, text } => json!({ "match": { field: text } }),
            Query::MatchAll => json!({ "match_all": {} }),
        }
    }
}

/// A named prefix-completion request against a completion field.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub name: String,
    pub field: String,
    pub text: String,
    pub size: usize,
}

impl CompletionRequest {
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            &self.name: {
                "text": self.text,
                "completion": { "field": self.field, "size": self.size }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestOption {
    pub text: String,
    pub score: f64,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    pub id: String,
    pub source: Value,
}

/// Operations the store needs from a per-tenant document search engine.
///
/// Indexes are tenant namespaces; collections partition documents inside an
/// index and carry their own mapping.
pub trait SearchBackend: Send + Sync {
    fn index_exists(&self, index: &str) -> Result<bool>;

    /// Creates the index. Fails with [`Error::AlreadyExists`] if it is already there.
    fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()>;

    fn collection_exists(&self, index: &str, collection: &str) -> Result<bool>;
    fn put_collection_mapping(
        &self,
        index: &str,
        collection: &str,
        mapping: &CollectionMapping,
    ) -> Result<()>;

    fn get_document(&self, index: &str, collection: &str, id: &str)
    -> Result<Option<StoredDocument>>;

    /// Writes a document only if `id` is unused. Returns false if it already existed.
    fn create_document(&self, index: &str, collection: &str, id: &str, source: &Value)
    -> Result<bool>;

    /// Replaces a document if its current version is `version`, returning the new
    /// version. A mismatch fails with [`Error::Conflict`].
    fn replace_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        source: &Value,
        version: u64,
    ) -> Result<u64>;

    /// Merges `partial` into an existing document.
    fn update_document(&self, index: &str, collection: &str, id: &str, partial: &Value)
    -> Result<()>;

    /// Removes a document. Returns false if there was nothing to remove.
    fn delete_document(&self, index: &str, collection: &str, id: &str) -> Result<bool>;

    /// Indexes documents in one request and reports the ones that failed.
    fn bulk_index(
        &self,
        index: &str,
        collection: &str,
        documents: &[BulkDocument],
    ) -> Result<Vec<WriteFailure>>;

    /// Runs `query` in one collection. `None` uses the backend's default page size.
    fn search(
        &self,
        index: &str,
        collection: &str,
        query: &Query,
        size: Option<usize>,
    ) -> Result<Vec<StoredDocument>>;

    fn suggest(&self, index: &str, request: &CompletionRequest) -> Result<Vec<SuggestOption>>;
}
