//! The repository index store.
//!
//! Each tenant owns one index in the search backend. Inside it, the
//! `repository` collection caches the provider's repository list and tracks
//! activation, and every activated repository gets a collection of its own
//! holding its commits.
//!
//! Read operations never provision anything: when the tenant, its index or
//! its repository collection is missing they fail with
//! [`Error::NotProvisioned`] and the caller is expected to run
//! [`IndexStore::sync_repositories`] and retry once.

mod validation;

pub use validation::validate_repo_name;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use crate::backend::{BulkDocument, CompletionRequest, Query, SearchBackend, StoredDocument};
use crate::error::{Error, Result, WriteFailure};
use crate::schema::{
    COMMIT_MESSAGE_FIELD, IndexDefinition, REPOSITORY_COLLECTION, SUGGEST_FIELD,
    repository_mapping,
};
use crate::tenant::{TenantRegistry, hash_token};
use crate::types::{
    BackfillState, Commit, Repository, RepositoryDocument, Suggest, SuggestPayload, Tenant,
    UpstreamRepository,
};
use crate::upstream::UpstreamClient;

const SUGGESTER_NAME: &str = "repository-suggest";
const DEFAULT_SUGGEST_SIZE: usize = 10;
const BULK_CHUNK_SIZE: usize = 500;

pub struct IndexStore {
    backend: Arc<dyn SearchBackend>,
    upstream: Arc<dyn UpstreamClient>,
    tenants: Arc<dyn TenantRegistry>,
    suggest_size: usize,
}

impl IndexStore {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        upstream: Arc<dyn UpstreamClient>,
        tenants: Arc<dyn TenantRegistry>,
    ) -> Self {
        Self {
            backend,
            upstream,
            tenants,
            suggest_size: DEFAULT_SUGGEST_SIZE,
        }
    }

    #[must_use]
    pub fn with_suggest_size(mut self, size: usize) -> Self {
        self.suggest_size = size.max(1);
        self
    }

    // Tenant resolution

    /// Resolves a token to its tenant without contacting the provider.
    pub fn lookup_tenant(&self, token: &str) -> Result<Option<Tenant>> {
        self.tenants.find_by_token_hash(&hash_token(token))
    }

    /// Resolves a token to its tenant, asking the provider who owns an unknown token.
    pub fn provision_tenant(&self, token: &str) -> Result<Tenant> {
        let token_hash = hash_token(token);
        if let Some(tenant) = self.tenants.find_by_token_hash(&token_hash)? {
            return Ok(tenant);
        }
        let login = self.upstream.fetch_username(token)?;
        let tenant = self.tenants.get_or_create_by_login(&login)?;
        self.tenants.bind_token(&token_hash, &tenant.id)?;
        tracing::info!("Bound new token to tenant {} ({})", tenant.id, tenant.login);
        Ok(tenant)
    }

    fn require_tenant(&self, token: &str) -> Result<Tenant> {
        self.lookup_tenant(token)?
            .ok_or_else(|| Error::NotProvisioned("token is not bound to a tenant".into()))
    }

    fn require_provisioned(&self, token: &str) -> Result<Tenant> {
        let tenant = self.require_tenant(token)?;
        let index = tenant.index_name();
        if !self.index_exists(&index) {
            return Err(Error::NotProvisioned(format!("index {index} does not exist")));
        }
        if !self.collection_exists(&index, REPOSITORY_COLLECTION) {
            return Err(Error::NotProvisioned(format!(
                "index {index} has no {REPOSITORY_COLLECTION} collection"
            )));
        }
        Ok(tenant)
    }

    // Existence probes. A failed probe counts as "absent".

    fn index_exists(&self, index: &str) -> bool {
        self.backend.index_exists(index).unwrap_or_else(|e| {
            tracing::warn!("Index probe for {} failed, treating as absent: {e}", index);
            false
        })
    }

    fn collection_exists(&self, index: &str, collection: &str) -> bool {
        self.backend
            .collection_exists(index, collection)
            .unwrap_or_else(|e| {
                tracing::warn!(
                    "Collection probe for {}/{} failed, treating as absent: {e}",
                    index,
                    collection
                );
                false
            })
    }

    // Provisioning

    /// Makes sure the token's tenant and its index exist. Safe to call repeatedly.
    pub fn ensure_tenant(&self, token: &str) -> Result<Tenant> {
        let tenant = self.provision_tenant(token)?;
        self.ensure_index(&tenant.index_name())?;
        Ok(tenant)
    }

    fn ensure_index(&self, index: &str) -> Result<()> {
        if self.index_exists(index) {
            return Ok(());
        }
        match self.backend.create_index(index, &IndexDefinition::tenant()?) {
            Ok(()) => {
                tracing::info!("Provisioned tenant index {}", index);
                Ok(())
            }
            Err(Error::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Applies the completion mapping to the repository collection if it has none yet.
    pub fn ensure_repository_collection(&self, token: &str) -> Result<()> {
        let tenant = self.require_tenant(token)?;
        let index = tenant.index_name();
        if !self.index_exists(&index) {
            return Err(Error::NotProvisioned(format!("index {index} does not exist")));
        }
        self.ensure_repository_mapping(&index)
    }

    fn ensure_repository_mapping(&self, index: &str) -> Result<()> {
        if self.collection_exists(index, REPOSITORY_COLLECTION) {
            return Ok(());
        }
        self.backend
            .put_collection_mapping(index, REPOSITORY_COLLECTION, &repository_mapping()?)?;
        tracing::info!("Mapped {} collection in index {}", REPOSITORY_COLLECTION, index);
        Ok(())
    }

    // Sync

    /// Copies the provider's repository list into the tenant index.
    ///
    /// Existing records keep their activation state; only a changed name is
    /// written back. Returns every repository with its stored state.
    pub fn sync_repositories(&self, token: &str) -> Result<Vec<Repository>> {
        let tenant = self.ensure_tenant(token)?;
        let index = tenant.index_name();

        let upstream = self.upstream.fetch_repositories(token)?;
        self.ensure_repository_mapping(&index)?;

        let mut seen = HashSet::new();
        let upstream: Vec<UpstreamRepository> = upstream
            .into_iter()
            .filter(|repo| {
                let first = seen.insert(repo.name.clone());
                if !first {
                    tracing::warn!(
                        "Skipping repository {} ({}): name already synced for tenant {}",
                        repo.name,
                        repo.id,
                        tenant.id
                    );
                }
                first
            })
            .collect();
        let live: HashSet<i64> = upstream.iter().map(|repo| repo.id).collect();

        let mut synced = Vec::with_capacity(upstream.len());
        let mut failures = Vec::new();
        for repo in &upstream {
            match self.sync_repository(&index, repo, &live) {
                Ok(repository) => synced.push(repository),
                Err(e) => failures.push(WriteFailure {
                    id: repo.id.to_string(),
                    reason: format!("{}: {e}", repo.name),
                }),
            }
        }

        if !failures.is_empty() {
            return Err(Error::PartialWrite {
                collection: REPOSITORY_COLLECTION.to_string(),
                failures,
            });
        }
        tracing::info!("Synced {} repositories into index {}", synced.len(), index);
        Ok(synced)
    }

    fn sync_repository(
        &self,
        index: &str,
        repo: &UpstreamRepository,
        live: &HashSet<i64>,
    ) -> Result<Repository> {
        self.retire_stale_holders(index, repo, live)?;

        let id = repo.id.to_string();
        let doc = RepositoryDocument::new(repo.id, &repo.name);
        if self
            .backend
            .create_document(index, REPOSITORY_COLLECTION, &id, &serde_json::to_value(&doc)?)?
        {
            tracing::debug!("Indexed repository {} to index {}", repo.name, index);
            return Ok(doc.into());
        }

        let stored = self
            .backend
            .get_document(index, REPOSITORY_COLLECTION, &id)?
            .ok_or_else(|| Error::backend("sync", format!("repository {id} disappeared")))?;
        let mut existing: RepositoryDocument = stored.parse()?;
        if existing.name != repo.name {
            self.backend.update_document(
                index,
                REPOSITORY_COLLECTION,
                &id,
                &json!({
                    "name": repo.name,
                    "suggest": Suggest::for_repository(repo.id, &repo.name),
                }),
            )?;
            tracing::info!(
                "Renamed repository {} to {} in index {}",
                existing.name,
                repo.name,
                index
            );
            existing.name.clone_from(&repo.name);
        }
        Ok(existing.into())
    }

    /// Deletes records that still hold `repo.name` under an id the provider no
    /// longer lists, so a name maps to one record. Holders that are still
    /// listed keep their record; they get renamed when their turn comes.
    fn retire_stale_holders(
        &self,
        index: &str,
        repo: &UpstreamRepository,
        live: &HashSet<i64>,
    ) -> Result<()> {
        let holders = self.backend.search(
            index,
            REPOSITORY_COLLECTION,
            &Query::term("name", repo.name.as_str()),
            None,
        )?;
        for holder in holders {
            let record: RepositoryDocument = holder.parse()?;
            if record.id == repo.id || live.contains(&record.id) {
                continue;
            }
            self.backend
                .delete_document(index, REPOSITORY_COLLECTION, &holder.id)?;
            tracing::info!(
                "Retired repository {} ({}) in index {}: name now belongs to {}",
                record.name,
                record.id,
                index,
                repo.id
            );
        }
        Ok(())
    }

    // Queries

    /// Names of inactive repositories completing `prefix`, in backend order.
    pub fn suggest_inactive(&self, token: &str, prefix: &str) -> Result<Vec<String>> {
        let tenant = self.require_provisioned(token)?;
        let index = tenant.index_name();

        let request = CompletionRequest {
            name: SUGGESTER_NAME.to_string(),
            field: SUGGEST_FIELD.to_string(),
            text: prefix.to_string(),
            size: self.suggest_size,
        };
        let options = self.backend.suggest(&index, &request)?;

        let mut names = Vec::new();
        for option in options {
            let payload: SuggestPayload = option
                .payload
                .and_then(|p| serde_json::from_value(p).ok())
                .ok_or_else(|| {
                    Error::backend("suggest", format!("option {} has no payload id", option.text))
                })?;
            if !self.repository_active(&index, payload.id)? {
                names.push(option.text);
            }
        }
        Ok(names)
    }

    /// Point lookup of a repository's activation flag by provider id.
    pub fn is_activated(&self, token: &str, id: i64) -> Result<bool> {
        let tenant = self.require_provisioned(token)?;
        self.repository_active(&tenant.index_name(), id)
    }

    fn repository_active(&self, index: &str, id: i64) -> Result<bool> {
        let doc: RepositoryDocument = self
            .backend
            .get_document(index, REPOSITORY_COLLECTION, &id.to_string())?
            .ok_or_else(|| Error::NotFound(format!("repository id {id}")))?
            .parse()?;
        Ok(doc.active)
    }

    /// Active repositories, limited to the backend's default page size.
    pub fn list_active(&self, token: &str) -> Result<Vec<Repository>> {
        let tenant = self.require_provisioned(token)?;
        self.backend
            .search(
                &tenant.index_name(),
                REPOSITORY_COLLECTION,
                &Query::term("active", true),
                None,
            )?
            .iter()
            .map(|hit| hit.parse::<RepositoryDocument>().map(Repository::from))
            .collect()
    }

    /// Commits of an activated repository whose message matches `text`.
    pub fn search_commits(&self, token: &str, name: &str, text: &str) -> Result<Vec<Commit>> {
        validate_repo_name(name)?;
        let tenant = self.require_provisioned(token)?;
        let index = tenant.index_name();

        let (_, record) = self
            .find_repository(&index, name)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        if record.state != BackfillState::Ready {
            return Err(Error::Conflict(format!("repository {name} is not activated")));
        }

        let query = Query::full_text(COMMIT_MESSAGE_FIELD, text);
        self.backend
            .search(&index, record.commit_collection(), &query, None)?
            .iter()
            .map(StoredDocument::parse::<Commit>)
            .collect()
    }

    /// Exact-name lookup, re-read by id so the returned version is current.
    fn find_repository(
        &self,
        index: &str,
        name: &str,
    ) -> Result<Option<(StoredDocument, RepositoryDocument)>> {
        let hits = self.backend.search(
            index,
            REPOSITORY_COLLECTION,
            &Query::term("name", name),
            Some(1),
        )?;
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };
        let Some(stored) = self
            .backend
            .get_document(index, REPOSITORY_COLLECTION, &hit.id)?
        else {
            return Ok(None);
        };
        let record = stored.parse()?;
        Ok(Some((stored, record)))
    }

    // Activation

    /// Backfills a repository's commits, then marks it active.
    ///
    /// The record is claimed with a versioned write before any commit is
    /// fetched, so a concurrent activation of the same repository fails with
    /// [`Error::Conflict`] instead of backfilling twice. The claim also fixes
    /// the commit collection. If the backfill or the final flag write fails,
    /// the claim is released; commits written before the failure stay and are
    /// overwritten by the next attempt.
    pub fn activate(&self, token: &str, name: &str) -> Result<()> {
        validate_repo_name(name)?;
        let tenant = self.require_provisioned(token)?;
        let index = tenant.index_name();

        let (stored, record) = self
            .find_repository(&index, name)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        match record.state {
            BackfillState::Ready => {
                if !record.active {
                    self.mark_ready(&index, &stored.id)?;
                }
                return Ok(());
            }
            BackfillState::Backfilling => {
                return Err(Error::Conflict(format!(
                    "backfill of {name} is already in progress"
                )));
            }
            BackfillState::Uninitialized => {}
        }

        let collection = match record.collection.clone() {
            Some(collection) => collection,
            None => self.choose_commit_collection(&index, name, record.id),
        };
        let claimed = RepositoryDocument {
            state: BackfillState::Backfilling,
            collection: Some(collection.clone()),
            ..record
        };
        self.backend
            .replace_document(
                &index,
                REPOSITORY_COLLECTION,
                &stored.id,
                &serde_json::to_value(&claimed)?,
                stored.version,
            )
            .map_err(|e| match e {
                Error::Conflict(_) => {
                    Error::Conflict(format!("activation of {name} is already in progress"))
                }
                e => e,
            })?;

        let count = match self
            .backfill(token, &index, name, &collection)
            .and_then(|count| self.mark_ready(&index, &stored.id).map(|()| count))
        {
            Ok(count) => count,
            Err(e) => {
                self.release_claim(&index, &stored.id);
                return Err(e);
            }
        };

        tracing::info!(
            "Activated repository {} in index {} with {} commits",
            name,
            index,
            count
        );
        Ok(())
    }

    /// Commits go to a collection named after the repository, unless that
    /// collection already holds another repository's commits.
    fn choose_commit_collection(&self, index: &str, name: &str, id: i64) -> String {
        if self.collection_exists(index, name) {
            let collection = format!("{name}@{id}");
            tracing::info!(
                "Collection {}/{} is taken, backfilling into {}",
                index,
                name,
                collection
            );
            collection
        } else {
            name.to_string()
        }
    }

    fn mark_ready(&self, index: &str, id: &str) -> Result<()> {
        self.backend.update_document(
            index,
            REPOSITORY_COLLECTION,
            id,
            &json!({ "state": BackfillState::Ready, "active": true }),
        )
    }

    fn release_claim(&self, index: &str, id: &str) {
        if let Err(e) = self.backend.update_document(
            index,
            REPOSITORY_COLLECTION,
            id,
            &json!({ "state": BackfillState::Uninitialized }),
        ) {
            tracing::warn!("Failed to release backfill claim on {}/{}: {e}", index, id);
        }
    }

    fn backfill(&self, token: &str, index: &str, name: &str, collection: &str) -> Result<usize> {
        let owner = self.upstream.fetch_username(token)?;
        let commits = self.upstream.fetch_commits(token, &owner, name)?;

        let documents = commits
            .into_iter()
            .map(|c| {
                Ok(BulkDocument {
                    id: c.sha.clone(),
                    source: serde_json::to_value(Commit::from(c))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for chunk in documents.chunks(BULK_CHUNK_SIZE) {
            let failures = self.backend.bulk_index(index, collection, chunk)?;
            if !failures.is_empty() {
                return Err(Error::PartialWrite {
                    collection: collection.to_string(),
                    failures,
                });
            }
        }
        tracing::debug!(
            "Indexed {} commits of {}/{} into {}/{}",
            documents.len(),
            owner,
            name,
            index,
            collection
        );
        Ok(documents.len())
    }
}
