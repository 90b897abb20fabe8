pub const SCHEMA: &str = r#"
-- Tenants are stable storage namespaces, keyed by provider login
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    login TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Access tokens resolve to a tenant; only a SHA-256 digest of the token is kept
CREATE TABLE IF NOT EXISTS tenant_tokens (
    token_hash TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tenant_tokens_tenant ON tenant_tokens(tenant_id);
"#;
