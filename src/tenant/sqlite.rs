use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::TenantRegistry;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::Tenant;

pub struct SqliteTenantRegistry {
    conn: Mutex<Connection>,
}

impl SqliteTenantRegistry {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_connection(Connection::open(db_path)?)
    }

    /// A registry that lives only as long as the process.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn tenant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        login: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
    })
}

impl TenantRegistry for SqliteTenantRegistry {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Tenant>> {
        let conn = self.conn();
        let tenant = conn
            .query_row(
                "SELECT t.id, t.login, t.created_at
                 FROM tenant_tokens tt JOIN tenants t ON t.id = tt.tenant_id
                 WHERE tt.token_hash = ?1",
                params![token_hash],
                tenant_from_row,
            )
            .optional()?;

        if tenant.is_some() {
            if let Err(e) = conn.execute(
                "UPDATE tenant_tokens SET last_used_at = ?1 WHERE token_hash = ?2",
                params![format_datetime(&Utc::now()), token_hash],
            ) {
                tracing::warn!("Failed to update token last_used_at: {e}");
            }
        }
        Ok(tenant)
    }

    fn get_or_create_by_login(&self, login: &str) -> Result<Tenant> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tenants (id, login, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(login) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                login,
                format_datetime(&Utc::now())
            ],
        )?;
        conn.query_row(
            "SELECT id, login, created_at FROM tenants WHERE login = ?1",
            params![login],
            tenant_from_row,
        )
        .map_err(Error::from)
    }

    fn bind_token(&self, token_hash: &str, tenant_id: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tenant_tokens (token_hash, tenant_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(token_hash) DO UPDATE SET tenant_id = excluded.tenant_id",
            params![token_hash, tenant_id, format_datetime(&Utc::now())],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::hash_token;

    fn registry() -> SqliteTenantRegistry {
        let registry = SqliteTenantRegistry::in_memory().unwrap();
        registry.initialize().unwrap();
        registry
    }

    #[test]
    fn test_unknown_token_resolves_to_none() {
        let registry = registry();
        assert!(
            registry
                .find_by_token_hash(&hash_token("nope"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_login_maps_to_one_tenant() {
        let registry = registry();
        let first = registry.get_or_create_by_login("alice").unwrap();
        let second = registry.get_or_create_by_login("alice").unwrap();
        assert_eq!(first.id, second.id);
        assert_ne!(
            first.id,
            registry.get_or_create_by_login("bob").unwrap().id
        );
    }

    #[test]
    fn test_rotated_token_reaches_same_tenant() {
        let registry = registry();
        let tenant = registry.get_or_create_by_login("alice").unwrap();
        registry.bind_token(&hash_token("old"), &tenant.id).unwrap();
        registry.bind_token(&hash_token("new"), &tenant.id).unwrap();

        let via_old = registry.find_by_token_hash(&hash_token("old")).unwrap().unwrap();
        let via_new = registry.find_by_token_hash(&hash_token("new")).unwrap().unwrap();
        assert_eq!(via_old, via_new);
        assert_eq!(via_new.login, "alice");
    }

    #[test]
    fn test_registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitsift.db");
        let tenant_id = {
            let registry = SqliteTenantRegistry::new(&path).unwrap();
            registry.initialize().unwrap();
            let tenant = registry.get_or_create_by_login("alice").unwrap();
            registry.bind_token(&hash_token("tok"), &tenant.id).unwrap();
            tenant.id
        };

        let reopened = SqliteTenantRegistry::new(&path).unwrap();
        reopened.initialize().unwrap();
        let tenant = reopened.find_by_token_hash(&hash_token("tok")).unwrap().unwrap();
        assert_eq!(tenant.id, tenant_id);
    }
}
