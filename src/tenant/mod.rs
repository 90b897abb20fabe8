//! Maps access tokens to stable tenants so that rotating a token keeps its data.

mod schema;
mod sqlite;

pub use sqlite::SqliteTenantRegistry;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::Tenant;

/// Persistent token -> tenant mapping.
pub trait TenantRegistry: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Resolves a token digest, recording the use.
    fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Tenant>>;

    /// Returns the tenant owning `login`, creating it on first sight.
    fn get_or_create_by_login(&self, login: &str) -> Result<Tenant>;

    /// Points a token digest at a tenant, replacing any earlier binding.
    fn bind_token(&self, token_hash: &str, tenant_id: &str) -> Result<()>;
}

/// Hex-encoded SHA-256 of a raw token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
