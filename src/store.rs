//! SQLite persistence for accounts and command overrides.
//!
//! The core only sees the [`PermissionStore`] and [`OverrideStore`] traits.
//! [`SqliteStore`] opens one connection per operation and relies on SQLite for
//! statement-level atomicity.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::permissions::PermissionSet;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already exists")]
    Conflict,
    #[error("account not found")]
    NotFound,
    #[error("cannot delete the last administrator account")]
    LastAdminGuard,
    #[error("store db error: {0}")]
    Db(String),
    #[error("store corruption: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                StoreError::Conflict
            }
            _ => StoreError::Db(err.to_string()),
        }
    }
}

/// Full account row, including the password hash.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub permissions: PermissionSet,
}

/// Account as exposed to management endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: i64,
    pub username: String,
    pub permissions: PermissionSet,
}

impl From<Account> for AccountSummary {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            username: a.username,
            permissions: a.permissions,
        }
    }
}

/// Authoritative permission state per account.
pub trait PermissionStore: Send + Sync {
    fn get(&self, username: &str) -> Result<PermissionSet, StoreError>;
    fn find_by_username(&self, username: &str) -> Result<Account, StoreError>;
    fn find_by_id(&self, id: i64) -> Result<Account, StoreError>;
    fn create(
        &self,
        username: &str,
        password_hash: &str,
        permissions: PermissionSet,
    ) -> Result<i64, StoreError>;
    /// Merge recognized boolean keys into the stored set and return the result.
    fn update(&self, id: i64, partial: &Map<String, Value>) -> Result<PermissionSet, StoreError>;
    /// Refuses to remove the only account holding `manage_users`.
    fn delete(&self, id: i64) -> Result<(), StoreError>;
    /// All accounts ordered by id.
    fn list(&self) -> Result<Vec<AccountSummary>, StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
}

/// Persisted command template overrides keyed by action key.
pub trait OverrideStore: Send + Sync {
    fn get_override(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn list_overrides(&self) -> Result<BTreeMap<String, String>, StoreError>;
    fn upsert_overrides(&self, overrides: &BTreeMap<String, String>) -> Result<(), StoreError>;
    /// Drop every override and write `overrides` in their place.
    fn replace_overrides(&self, overrides: &BTreeMap<String, String>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        let conn = store.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                permissions TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS commands (
                action_key TEXT PRIMARY KEY,
                template TEXT NOT NULL
            );",
        )?;
        info!(path = %store.path.display(), "database ready");
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }
}

/// Stored sets are parsed leniently so rows written with fewer capabilities
/// still load, missing keys `false`.
fn parse_permissions(raw: &str) -> Result<PermissionSet, StoreError> {
    let map: Map<String, Value> = serde_json::from_str(raw)
        .map_err(|e| StoreError::Corrupt(format!("permissions column: {e}")))?;
    Ok(PermissionSet::from_partial(&map))
}

fn encode_permissions(set: &PermissionSet) -> Result<String, StoreError> {
    serde_json::to_string(set).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn read_account(
    conn: &Connection,
    sql: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Account, StoreError> {
    let row = conn
        .query_row(sql, [param], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .optional()?;
    let (id, username, password_hash, raw) = row.ok_or(StoreError::NotFound)?;
    Ok(Account {
        id,
        username,
        password_hash,
        permissions: parse_permissions(&raw)?,
    })
}

fn all_accounts(conn: &Connection) -> Result<Vec<AccountSummary>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, username, permissions FROM users ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, username, raw) = row?;
        out.push(AccountSummary {
            id,
            username,
            permissions: parse_permissions(&raw)?,
        });
    }
    Ok(out)
}

impl PermissionStore for SqliteStore {
    fn get(&self, username: &str) -> Result<PermissionSet, StoreError> {
        Ok(self.find_by_username(username)?.permissions)
    }

    fn find_by_username(&self, username: &str) -> Result<Account, StoreError> {
        let conn = self.connect()?;
        read_account(
            &conn,
            "SELECT id, username, password_hash, permissions FROM users WHERE username = ?1",
            &username,
        )
    }

    fn find_by_id(&self, id: i64) -> Result<Account, StoreError> {
        let conn = self.connect()?;
        read_account(
            &conn,
            "SELECT id, username, password_hash, permissions FROM users WHERE id = ?1",
            &id,
        )
    }

    fn create(
        &self,
        username: &str,
        password_hash: &str,
        permissions: PermissionSet,
    ) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO users (username, password_hash, permissions) VALUES (?1, ?2, ?3)",
            params![username, password_hash, encode_permissions(&permissions)?],
        )?;
        let id = conn.last_insert_rowid();
        debug!(user = %username, id, "account created");
        Ok(id)
    }

    fn update(&self, id: i64, partial: &Map<String, Value>) -> Result<PermissionSet, StoreError> {
        let conn = self.connect()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT permissions FROM users WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let mut permissions = parse_permissions(&raw.ok_or(StoreError::NotFound)?)?;
        permissions.merge_partial(partial);
        conn.execute(
            "UPDATE users SET permissions = ?1 WHERE id = ?2",
            params![encode_permissions(&permissions)?, id],
        )?;
        Ok(permissions)
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let accounts = all_accounts(&tx)?;
        let target = accounts
            .iter()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        if target.permissions.manage_users {
            let admins = accounts
                .iter()
                .filter(|a| a.permissions.manage_users)
                .count();
            if admins <= 1 {
                return Err(StoreError::LastAdminGuard);
            }
        }
        tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<AccountSummary>, StoreError> {
        let conn = self.connect()?;
        all_accounts(&conn)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl OverrideStore for SqliteStore {
    fn get_override(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                "SELECT template FROM commands WHERE action_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn list_overrides(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT action_key, template FROM commands")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (key, template) = row?;
            out.insert(key, template);
        }
        Ok(out)
    }

    fn upsert_overrides(&self, overrides: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let conn = self.connect()?;
        for (key, template) in overrides {
            conn.execute(
                "INSERT INTO commands (action_key, template) VALUES (?1, ?2)
                 ON CONFLICT(action_key) DO UPDATE SET template = excluded.template",
                params![key, template],
            )?;
        }
        Ok(())
    }

    fn replace_overrides(&self, overrides: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM commands", [])?;
        for (key, template) in overrides {
            tx.execute(
                "INSERT INTO commands (action_key, template) VALUES (?1, ?2)",
                params![key, template],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("syspilot.db")).unwrap();
        (dir, store)
    }

    fn admin() -> PermissionSet {
        PermissionSet::all()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, store) = store();
        let id = store.create("alice", "hash", admin()).unwrap();
        assert_eq!(store.get("alice").unwrap(), admin());
        let account = store.find_by_id(id).unwrap();
        assert_eq!(account.username, "alice");
        assert_eq!(account.password_hash, "hash");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get("ghost"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let (_dir, store) = store();
        store.create("alice", "h1", admin()).unwrap();
        assert!(matches!(
            store.create("alice", "h2", PermissionSet::default()),
            Err(StoreError::Conflict)
        ));
    }

    #[test]
    fn test_update_merges_and_drops_junk() {
        let (_dir, store) = store();
        let id = store
            .create("bob", "h", PermissionSet::default())
            .unwrap();
        let merged = store
            .update(
                id,
                &obj(json!({"shutdown": true, "lock": "true", "warp_drive": true})),
            )
            .unwrap();
        assert!(merged.shutdown);
        assert!(!merged.lock);
        assert_eq!(store.get("bob").unwrap(), merged);
    }

    #[test]
    fn test_update_with_empty_map_is_noop() {
        let (_dir, store) = store();
        let perms = PermissionSet {
            volume: true,
            lock: true,
            ..Default::default()
        };
        let id = store.create("bob", "h", perms).unwrap();
        assert_eq!(store.update(id, &Map::new()).unwrap(), perms);
        assert_eq!(store.get("bob").unwrap(), perms);
    }

    #[test]
    fn test_update_true_then_false() {
        let (_dir, store) = store();
        let id = store
            .create("bob", "h", PermissionSet::default())
            .unwrap();
        store.update(id, &obj(json!({"restart": true}))).unwrap();
        let after = store.update(id, &obj(json!({"restart": false}))).unwrap();
        assert!(!after.restart);
    }

    #[test]
    fn test_update_missing_account() {
        let (_dir, store) = store();
        assert!(matches!(
            store.update(42, &Map::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_delete_last_admin_is_refused() {
        let (_dir, store) = store();
        let id = store.create("root", "h", admin()).unwrap();
        store
            .create("guest", "h", PermissionSet::default())
            .unwrap();
        assert!(matches!(store.delete(id), Err(StoreError::LastAdminGuard)));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_delete_second_admin_succeeds() {
        let (_dir, store) = store();
        store.create("root", "h", admin()).unwrap();
        let second = store.create("ops", "h", admin()).unwrap();
        store.delete(second).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(matches!(store.find_by_id(second), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_delete_missing_account() {
        let (_dir, store) = store();
        assert!(matches!(store.delete(7), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_list_is_ordered_by_id() {
        let (_dir, store) = store();
        store.create("zed", "h", admin()).unwrap();
        store
            .create("amy", "h", PermissionSet::default())
            .unwrap();
        let names: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(names, vec!["zed", "amy"]);
    }

    #[test]
    fn test_legacy_partial_row_loads_with_defaults() {
        let (_dir, store) = store();
        let conn = store.connect().unwrap();
        conn.execute(
            "INSERT INTO users (username, password_hash, permissions) VALUES ('old', 'h', ?1)",
            params![r#"{"shutdown": true, "volume": true}"#],
        )
        .unwrap();
        let perms = store.get("old").unwrap();
        assert!(perms.shutdown && perms.volume);
        assert!(!perms.media_next);
    }

    #[test]
    fn test_overrides_upsert_and_replace() {
        let (_dir, store) = store();
        let mut first = BTreeMap::new();
        first.insert("shutdown".to_string(), "echo off".to_string());
        first.insert("lock".to_string(), "echo lock".to_string());
        store.upsert_overrides(&first).unwrap();

        let mut second = BTreeMap::new();
        second.insert("shutdown".to_string(), "echo bye".to_string());
        store.upsert_overrides(&second).unwrap();
        assert_eq!(
            store.get_override("shutdown").unwrap().as_deref(),
            Some("echo bye")
        );
        assert_eq!(store.list_overrides().unwrap().len(), 2);

        store.replace_overrides(&second).unwrap();
        assert_eq!(store.list_overrides().unwrap(), second);
        assert_eq!(store.get_override("lock").unwrap(), None);
    }
}
