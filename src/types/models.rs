use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

/// Where a repository is in its one-way trip towards a searchable commit corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillState {
    #[default]
    Uninitialized,
    Backfilling,
    Ready,
}

/// Document stored in the `repository` collection of a tenant index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDocument {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub state: BackfillState,
    /// Collection holding the commits, fixed when the backfill is claimed so
    /// that a later rename does not lose them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub suggest: Suggest,
}

/// Completion input for the repository name suggester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggest {
    pub input: Vec<String>,
    pub output: String,
    pub payload: SuggestPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestPayload {
    pub id: i64,
}

impl Suggest {
    #[must_use]
    pub fn for_repository(id: i64, name: &str) -> Self {
        Self {
            input: vec![name.to_string()],
            output: name.to_string(),
            payload: SuggestPayload { id },
        }
    }
}

impl RepositoryDocument {
    /// A freshly synced, inactive repository.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            suggest: Suggest::for_repository(id, &name),
            name,
            active: false,
            state: BackfillState::Uninitialized,
            collection: None,
        }
    }
}

impl RepositoryDocument {
    /// Where this repository's commits live.
    #[must_use]
    pub fn commit_collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(&self.name)
    }
}

impl From<RepositoryDocument> for Repository {
    fn from(doc: RepositoryDocument) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            active: doc.active,
        }
    }
}

/// Document stored in a repository's commit collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub message: String,
    pub url: String,
}

/// A repository as listed by the code-hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRepository {
    pub id: i64,
    pub name: String,
}

/// A commit as listed by the code-hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamCommit {
    pub sha: String,
    pub message: String,
    pub url: String,
}

impl From<UpstreamCommit> for Commit {
    fn from(commit: UpstreamCommit) -> Self {
        Self {
            message: commit.message,
            url: commit.url,
        }
    }
}

/// A stable storage namespace, independent of the token used to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub login: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Name of the tenant's index in the search backend.
    #[must_use]
    pub fn index_name(&self) -> String {
        format!("tenant-{}", self.id)
    }
}
