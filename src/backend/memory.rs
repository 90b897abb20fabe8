use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::{BulkDocument, CompletionRequest, Query, SearchBackend, StoredDocument, SuggestOption};
use crate::error::{Error, Result, WriteFailure};
use crate::schema::{CollectionMapping, IndexDefinition};

const DEFAULT_PAGE_SIZE: usize = 10;

/// In-process backend with the same observable contract as [`super::ElasticBackend`].
///
/// Collections written to without a mapping are created dynamically and get
/// no completion field, matching a real backend's dynamic mapping.
#[derive(Default)]
pub struct MemoryBackend {
    indexes: Mutex<HashMap<String, MemoryIndex>>,
}

struct MemoryIndex {
    definition: IndexDefinition,
    collections: BTreeMap<String, MemoryCollection>,
}

#[derive(Default)]
struct MemoryCollection {
    mapping: Option<CollectionMapping>,
    documents: BTreeMap<String, (u64, Value)>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn indexes(&self) -> MutexGuard<'_, HashMap<String, MemoryIndex>> {
        self.indexes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Definition the index was created with, if it exists.
    #[must_use]
    pub fn index_definition(&self, index: &str) -> Option<IndexDefinition> {
        self.indexes().get(index).map(|i| i.definition.clone())
    }

    /// Number of documents in a collection; zero when it does not exist.
    #[must_use]
    pub fn document_count(&self, index: &str, collection: &str) -> usize {
        self.indexes()
            .get(index)
            .and_then(|i| i.collections.get(collection))
            .map_or(0, |c| c.documents.len())
    }
}

fn index_missing(operation: &str, index: &str) -> Error {
    Error::backend(operation, format!("index_not_found_exception: no such index [{index}]"))
}

fn with_index<T>(
    indexes: &mut HashMap<String, MemoryIndex>,
    operation: &str,
    index: &str,
    f: impl FnOnce(&mut MemoryIndex) -> Result<T>,
) -> Result<T> {
    match indexes.get_mut(index) {
        Some(idx) => f(idx),
        None => Err(index_missing(operation, index)),
    }
}

fn stored(id: &str, version: u64, source: &Value) -> StoredDocument {
    StoredDocument {
        id: id.to_string(),
        version,
        source: source.clone(),
    }
}

/// Lowercases letters and collapses every run of other characters into one
/// space, the way the `simple` analyzer tokenizes.
fn simple_analyze(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_gap = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if pending_gap && !out.is_empty() {
                out.push(' ');
            }
            pending_gap = false;
            out.extend(c.to_lowercase());
        } else {
            pending_gap = true;
        }
    }
    if pending_gap && !out.is_empty() {
        out.push(' ');
    }
    out
}

fn matches(query: &Query, source: &Value) -> bool {
    match query {
        Query::MatchAll => true,
        Query::Term { field, value } => source.get(field) == Some(value),
        Query::Match { field, text } => {
            let Some(haystack) = source.get(field).and_then(Value::as_str) else {
                return false;
            };
            let haystack = haystack.to_lowercase();
            text.split_whitespace()
                .any(|term| haystack.contains(&term.to_lowercase()))
        }
    }
}

fn merge(target: &mut Value, partial: &Value) {
    match (target, partial) {
        (Value::Object(target), Value::Object(partial)) => {
            for (key, value) in partial {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, partial) => *target = partial.clone(),
    }
}

impl SearchBackend for MemoryBackend {
    fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indexes().contains_key(index))
    }

    fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        let mut indexes = self.indexes();
        if indexes.contains_key(index) {
            return Err(Error::AlreadyExists(format!("index {index}")));
        }
        indexes.insert(
            index.to_string(),
            MemoryIndex {
                definition: definition.clone(),
                collections: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn collection_exists(&self, index: &str, collection: &str) -> Result<bool> {
        Ok(self
            .indexes()
            .get(index)
            .is_some_and(|i| i.collections.contains_key(collection)))
    }

    fn put_collection_mapping(
        &self,
        index: &str,
        collection: &str,
        mapping: &CollectionMapping,
    ) -> Result<()> {
        with_index(&mut self.indexes(), "put mapping", index, |idx| {
            mapping.validate(idx.definition.analysis())?;
            let entry = idx.collections.entry(collection.to_string()).or_default();
            if entry.mapping.is_none() && !entry.documents.is_empty() {
                return Err(Error::backend(
                    "put mapping",
                    format!("collection [{collection}] already has a dynamic mapping"),
                ));
            }
            entry.mapping = Some(mapping.clone());
            Ok(())
        })
    }

    fn get_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>> {
        with_index(&mut self.indexes(), "get", index, |idx| {
            Ok(idx
                .collections
                .get(collection)
                .and_then(|c| c.documents.get(id))
                .map(|(version, source)| stored(id, *version, source)))
        })
    }

    fn create_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        source: &Value,
    ) -> Result<bool> {
        with_index(&mut self.indexes(), "create", index, |idx| {
            let documents = &mut idx
                .collections
                .entry(collection.to_string())
                .or_default()
                .documents;
            if documents.contains_key(id) {
                return Ok(false);
            }
            documents.insert(id.to_string(), (1, source.clone()));
            Ok(true)
        })
    }

    fn replace_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        source: &Value,
        version: u64,
    ) -> Result<u64> {
        with_index(&mut self.indexes(), "replace", index, |idx| {
            let current = idx
                .collections
                .get_mut(collection)
                .and_then(|c| c.documents.get_mut(id))
                .ok_or_else(|| Error::Conflict(format!("document {id} does not exist")))?;
            if current.0 != version {
                return Err(Error::Conflict(format!(
                    "document {id} is at version {}, expected {version}",
                    current.0
                )));
            }
            *current = (version + 1, source.clone());
            Ok(version + 1)
        })
    }

    fn update_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        partial: &Value,
    ) -> Result<()> {
        with_index(&mut self.indexes(), "update", index, |idx| {
            let current = idx
                .collections
                .get_mut(collection)
                .and_then(|c| c.documents.get_mut(id))
                .ok_or_else(|| {
                    Error::backend("update", format!("document_missing_exception: [{id}]"))
                })?;
            merge(&mut current.1, partial);
            current.0 += 1;
            Ok(())
        })
    }

    fn delete_document(&self, index: &str, collection: &str, id: &str) -> Result<bool> {
        with_index(&mut self.indexes(), "delete", index, |idx| {
            Ok(idx
                .collections
                .get_mut(collection)
                .and_then(|c| c.documents.remove(id))
                .is_some())
        })
    }

    fn bulk_index(
        &self,
        index: &str,
        collection: &str,
        documents: &[BulkDocument],
    ) -> Result<Vec<WriteFailure>> {
        with_index(&mut self.indexes(), "bulk", index, |idx| {
            let target = &mut idx
                .collections
                .entry(collection.to_string())
                .or_default()
                .documents;
            let mut failures = Vec::new();
            for doc in documents {
                if !doc.source.is_object() {
                    failures.push(WriteFailure {
                        id: doc.id.clone(),
                        reason: "mapper_parsing_exception: document is not an object".into(),
                    });
                    continue;
                }
                let version = target.get(&doc.id).map_or(1, |(v, _)| v + 1);
                target.insert(doc.id.clone(), (version, doc.source.clone()));
            }
            Ok(failures)
        })
    }

    fn search(
        &self,
        index: &str,
        collection: &str,
        query: &Query,
        size: Option<usize>,
    ) -> Result<Vec<StoredDocument>> {
        with_index(&mut self.indexes(), "search", index, |idx| {
            let Some(coll) = idx.collections.get(collection) else {
                return Ok(Vec::new());
            };
            Ok(coll
                .documents
                .iter()
                .filter(|(_, (_, source))| matches(query, source))
                .take(size.unwrap_or(DEFAULT_PAGE_SIZE))
                .map(|(id, (version, source))| stored(id, *version, source))
                .collect())
        })
    }

    fn suggest(&self, index: &str, request: &CompletionRequest) -> Result<Vec<SuggestOption>> {
        with_index(&mut self.indexes(), "suggest", index, |idx| {
            let completion_collections: Vec<&MemoryCollection> = idx
                .collections
                .values()
                .filter(|c| {
                    c.mapping
                        .as_ref()
                        .and_then(|m| m.field(&request.field))
                        .is_some_and(|f| f.is_completion())
                })
                .collect();
            if completion_collections.is_empty() {
                return Err(Error::backend(
                    "suggest",
                    format!("field [{}] is not a completion suggest field", request.field),
                ));
            }

            let prefix = simple_analyze(&request.text);
            let mut options: Vec<SuggestOption> = completion_collections
                .iter()
                .flat_map(|c| c.documents.values())
                .filter_map(|(_, source)| {
                    let suggest = source.get(&request.field)?;
                    let inputs = suggest.get("input")?.as_array()?;
                    let hit = inputs
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|input| simple_analyze(input).starts_with(&prefix));
                    if !hit {
                        return None;
                    }
                    let text = suggest
                        .get("output")
                        .and_then(Value::as_str)
                        .or_else(|| inputs.first().and_then(Value::as_str))?;
                    Some(SuggestOption {
                        text: text.to_string(),
                        score: 1.0,
                        payload: suggest.get("payload").cloned(),
                    })
                })
                .collect();
            options.sort_by(|a, b| a.text.cmp(&b.text));
            options.truncate(request.size);
            Ok(options)
        })
    }
}
