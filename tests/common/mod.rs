#![allow(dead_code)]

pub mod test_server;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use gitsift::backend::{
    BulkDocument, CompletionRequest, MemoryBackend, Query, SearchBackend, StoredDocument,
    SuggestOption,
};
use gitsift::error::{Error, Result, WriteFailure};
use gitsift::schema::{CollectionMapping, IndexDefinition};
use gitsift::store::IndexStore;
use gitsift::tenant::{SqliteTenantRegistry, TenantRegistry};
use gitsift::types::{UpstreamCommit, UpstreamRepository};
use gitsift::upstream::{UpstreamClient, UpstreamError};

/// In-process stand-in for the code-hosting provider.
#[derive(Default)]
pub struct FakeUpstream {
    users: Mutex<HashMap<String, String>>,
    repositories: Mutex<HashMap<String, Vec<UpstreamRepository>>>,
    commits: Mutex<HashMap<(String, String), Vec<UpstreamCommit>>>,
    commit_delay: Mutex<Option<Duration>>,
    fail_commits: AtomicBool,
    pub username_calls: AtomicUsize,
    pub repository_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, token: &str, login: &str) -> Self {
        self.add_token(token, login);
        self
    }

    pub fn add_token(&self, token: &str, login: &str) {
        self.users
            .lock()
            .unwrap()
            .insert(token.to_string(), login.to_string());
    }

    pub fn set_repositories(&self, login: &str, repos: &[(i64, &str)]) {
        let repos = repos
            .iter()
            .map(|(id, name)| UpstreamRepository {
                id: *id,
                name: (*name).to_string(),
            })
            .collect();
        self.repositories
            .lock()
            .unwrap()
            .insert(login.to_string(), repos);
    }

    pub fn set_commits(&self, owner: &str, repo: &str, commits: Vec<UpstreamCommit>) {
        self.commits
            .lock()
            .unwrap()
            .insert((owner.to_string(), repo.to_string()), commits);
    }

    pub fn delay_commits(&self, delay: Duration) {
        *self.commit_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn login(&self, token: &str) -> std::result::Result<String, UpstreamError> {
        self.users
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(UpstreamError::Unauthorized)
    }
}

impl UpstreamClient for FakeUpstream {
    fn fetch_username(&self, token: &str) -> std::result::Result<String, UpstreamError> {
        self.username_calls.fetch_add(1, Ordering::SeqCst);
        self.login(token)
    }

    fn fetch_repositories(
        &self,
        token: &str,
    ) -> std::result::Result<Vec<UpstreamRepository>, UpstreamError> {
        self.repository_calls.fetch_add(1, Ordering::SeqCst);
        let login = self.login(token)?;
        Ok(self
            .repositories
            .lock()
            .unwrap()
            .get(&login)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> std::result::Result<Vec<UpstreamCommit>, UpstreamError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.login(token)?;
        let delay = *self.commit_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(UpstreamError::Network("connection reset by peer".into()));
        }
        Ok(self
            .commits
            .lock()
            .unwrap()
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

pub fn commit(owner: &str, repo: &str, sha: &str, message: &str) -> UpstreamCommit {
    UpstreamCommit {
        sha: sha.to_string(),
        message: message.to_string(),
        url: format!("https://github.com/{owner}/{repo}/commit/{sha}"),
    }
}

/// Memory backend that records every mutating call in order.
#[derive(Default)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    log: Mutex<Vec<String>>,
    failing_update: Mutex<Option<String>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|l| l.starts_with(prefix)).count()
    }

    /// Position of the first logged call starting with `prefix` and containing `needle`.
    pub fn position(&self, prefix: &str, needle: &str) -> Option<usize> {
        self.log()
            .iter()
            .position(|l| l.starts_with(prefix) && l.contains(needle))
    }

    /// Makes the next partial update whose body contains `needle` time out.
    pub fn fail_update_once(&self, needle: &str) {
        *self.failing_update.lock().unwrap() = Some(needle.to_string());
    }

    fn take_failing_update(&self, partial: &Value) -> bool {
        let mut failing = self.failing_update.lock().unwrap();
        let hit = failing
            .as_deref()
            .is_some_and(|needle| partial.to_string().contains(needle));
        if hit {
            *failing = None;
        }
        hit
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl SearchBackend for RecordingBackend {
    fn index_exists(&self, index: &str) -> Result<bool> {
        self.inner.index_exists(index)
    }

    fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        self.record(format!("create_index {index}"));
        self.inner.create_index(index, definition)
    }

    fn collection_exists(&self, index: &str, collection: &str) -> Result<bool> {
        self.inner.collection_exists(index, collection)
    }

    fn put_collection_mapping(
        &self,
        index: &str,
        collection: &str,
        mapping: &CollectionMapping,
    ) -> Result<()> {
        self.record(format!("put_mapping {index}/{collection}"));
        self.inner.put_collection_mapping(index, collection, mapping)
    }

    fn get_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>> {
        self.inner.get_document(index, collection, id)
    }

    fn create_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        source: &Value,
    ) -> Result<bool> {
        self.record(format!("create {index}/{collection}/{id}"));
        self.inner.create_document(index, collection, id, source)
    }

    fn replace_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        source: &Value,
        version: u64,
    ) -> Result<u64> {
        self.record(format!("replace {index}/{collection}/{id} {source}"));
        self.inner
            .replace_document(index, collection, id, source, version)
    }

    fn update_document(
        &self,
        index: &str,
        collection: &str,
        id: &str,
        partial: &Value,
    ) -> Result<()> {
        self.record(format!("update {index}/{collection}/{id} {partial}"));
        if self.take_failing_update(partial) {
            return Err(Error::Timeout {
                service: "search backend",
            });
        }
        self.inner.update_document(index, collection, id, partial)
    }

    fn delete_document(&self, index: &str, collection: &str, id: &str) -> Result<bool> {
        self.record(format!("delete {index}/{collection}/{id}"));
        self.inner.delete_document(index, collection, id)
    }

    fn bulk_index(
        &self,
        index: &str,
        collection: &str,
        documents: &[BulkDocument],
    ) -> Result<Vec<WriteFailure>> {
        self.record(format!("bulk {index}/{collection} {}", documents.len()));
        self.inner.bulk_index(index, collection, documents)
    }

    fn search(
        &self,
        index: &str,
        collection: &str,
        query: &Query,
        size: Option<usize>,
    ) -> Result<Vec<StoredDocument>> {
        self.inner.search(index, collection, query, size)
    }

    fn suggest(&self, index: &str, request: &CompletionRequest) -> Result<Vec<SuggestOption>> {
        self.inner.suggest(index, request)
    }
}

pub fn index_store(backend: Arc<RecordingBackend>, upstream: Arc<FakeUpstream>) -> IndexStore {
    let registry = SqliteTenantRegistry::in_memory().expect("open registry");
    registry.initialize().expect("initialize registry");
    IndexStore::new(backend, upstream, Arc::new(registry))
}
