//! Permission record store over SQLite
//!
//! Schema:
//! - `permission_group(id, group_name UNIQUE, permissions)`: permission
//!   nodes serialized as a JSON array in a TEXT column.
//! - `member_permission(id, any_id, type, permissions, permission_groups,
//!   UNIQUE(any_id, type))`: one row per entity.
//!
//! Cross-process write serialization relies on SQLite's single-writer
//! database lock; in-process read-modify-write cycles are serialized by the
//! per-key locks of the cache layer above.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use bramble_domain::{EntityKey, EntityType, MemberPermissionRecord, PermissionGroupRecord};

use crate::error::{Result, StorageError};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS permission_group (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_name TEXT NOT NULL,
        permissions TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_permission_group_group_name
        ON permission_group (group_name)",
    "CREATE TABLE IF NOT EXISTS member_permission (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        any_id TEXT NOT NULL,
        type TEXT NOT NULL,
        permissions TEXT NOT NULL DEFAULT '[]',
        permission_groups TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_member_permission_any_id_type
        ON member_permission (any_id, type)",
];

#[derive(sqlx::FromRow)]
struct GroupRow {
    group_name: String,
    permissions: String,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    any_id: String,
    #[sqlx(rename = "type")]
    kind: String,
    permissions: String,
    permission_groups: String,
}

impl GroupRow {
    fn into_record(self) -> Result<PermissionGroupRecord> {
        Ok(PermissionGroupRecord {
            name: self.group_name,
            permissions: serde_json::from_str(&self.permissions)?,
        })
    }
}

impl MemberRow {
    fn into_record(self) -> Result<MemberPermissionRecord> {
        let kind = EntityType::from_str(&self.kind)
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        Ok(MemberPermissionRecord {
            entity: EntityKey::new(self.any_id, kind),
            permissions: serde_json::from_str(&self.permissions)?,
            permission_groups: serde_json::from_str(&self.permission_groups)?,
        })
    }
}

/// Durable store for permission groups and member permission records
pub struct PermissionStore {
    pool: SqlitePool,
}

impl PermissionStore {
    /// Open (creating if missing) the database at `url` and apply the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Store over an in-memory database. The pool is capped at a single
    /// connection because every SQLite `:memory:` connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool; the schema is assumed to be applied
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the schema DDL; safe to call repeatedly
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Look up a member record without creating one
    pub async fn find_member_permission(
        &self,
        id: &str,
        kind: EntityType,
    ) -> Result<Option<MemberPermissionRecord>> {
        let row = sqlx::query_as::<_, MemberRow>(
            "SELECT any_id, type, permissions, permission_groups
             FROM member_permission WHERE any_id = ? AND type = ?",
        )
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(MemberRow::into_record).transpose()
    }

    /// Fetch a member record, implicitly persisting an empty one when the
    /// entity has never been seen. Permission checks against unknown
    /// entities must land here and fall through to default-deny, never fail.
    pub async fn get_member_permission(
        &self,
        id: &str,
        kind: EntityType,
    ) -> Result<MemberPermissionRecord> {
        if let Some(record) = self.find_member_permission(id, kind).await? {
            return Ok(record);
        }

        debug!(id, kind = %kind, "creating empty member permission record");
        sqlx::query(
            "INSERT OR IGNORE INTO member_permission (any_id, type, permissions, permission_groups)
             VALUES (?, ?, '[]', '[]')",
        )
        .bind(id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        // Re-select: a concurrent creator may have won the insert race.
        self.find_member_permission(id, kind)
            .await?
            .ok_or_else(|| StorageError::MemberNotFound {
                id: id.to_string(),
                kind,
            })
    }

    /// Look up a permission group without creating one
    pub async fn find_permission_group(
        &self,
        name: &str,
    ) -> Result<Option<PermissionGroupRecord>> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT group_name, permissions FROM permission_group WHERE group_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(GroupRow::into_record).transpose()
    }

    /// Fetch a permission group, implicitly persisting an empty one when the
    /// name has never been seen
    pub async fn get_permission_group(&self, name: &str) -> Result<PermissionGroupRecord> {
        if let Some(record) = self.find_permission_group(name).await? {
            return Ok(record);
        }

        debug!(name, "creating empty permission group");
        sqlx::query("INSERT OR IGNORE INTO permission_group (group_name, permissions) VALUES (?, '[]')")
            .bind(name)
            .execute(&self.pool)
            .await?;

        self.find_permission_group(name)
            .await?
            .ok_or_else(|| StorageError::GroupNotFound {
                name: name.to_string(),
            })
    }

    /// Whether the named group exists; never creates
    pub async fn permission_group_exists(&self, name: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM permission_group WHERE group_name = ? LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Upsert a member record by its `(any_id, type)` key
    pub async fn update_member_permission(&self, record: &MemberPermissionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO member_permission (any_id, type, permissions, permission_groups)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (any_id, type) DO UPDATE SET
                 permissions = excluded.permissions,
                 permission_groups = excluded.permission_groups",
        )
        .bind(&record.entity.id)
        .bind(record.entity.kind.as_str())
        .bind(serde_json::to_string(&record.permissions)?)
        .bind(serde_json::to_string(&record.permission_groups)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a permission group by name
    pub async fn update_permission_group(&self, record: &PermissionGroupRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO permission_group (group_name, permissions) VALUES (?, ?)
             ON CONFLICT (group_name) DO UPDATE SET permissions = excluded.permissions",
        )
        .bind(&record.name)
        .bind(serde_json::to_string(&record.permissions)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a group; returns whether a row was removed
    pub async fn delete_permission_group(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM permission_group WHERE group_name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All stored permission groups
    pub async fn list_permission_groups(&self) -> Result<Vec<PermissionGroupRecord>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT group_name, permissions FROM permission_group ORDER BY group_name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(GroupRow::into_record).collect()
    }

    /// All stored member records of one entity kind
    pub async fn list_member_permissions(
        &self,
        kind: EntityType,
    ) -> Result<Vec<MemberPermissionRecord>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            "SELECT any_id, type, permissions, permission_groups
             FROM member_permission WHERE type = ? ORDER BY any_id",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MemberRow::into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> PermissionStore {
        PermissionStore::in_memory().await.unwrap()
    }

    async fn member_rows(store: &PermissionStore) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM member_permission")
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_member_creates_empty_record_once() {
        let store = store().await;

        let first = store
            .get_member_permission("u1", EntityType::User)
            .await
            .unwrap();
        let second = store
            .get_member_permission("u1", EntityType::User)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(first.permissions.is_empty());
        assert!(first.permission_groups.is_empty());
        assert_eq!(member_rows(&store).await, 1);
    }

    #[tokio::test]
    async fn test_same_id_different_kind_gets_separate_rows() {
        let store = store().await;

        store.get_member_permission("1", EntityType::User).await.unwrap();
        store
            .get_member_permission("1", EntityType::Group)
            .await
            .unwrap();
        assert_eq!(member_rows(&store).await, 2);
    }

    #[tokio::test]
    async fn test_member_upsert_round_trip() {
        let store = store().await;

        let mut record = MemberPermissionRecord::new(EntityKey::user("u1"));
        record.grant("chat.use").unwrap();
        record.join_group("vip");
        store.update_member_permission(&record).await.unwrap();

        let loaded = store
            .get_member_permission("u1", EntityType::User)
            .await
            .unwrap();
        assert_eq!(loaded, record);

        // Second upsert replaces rather than duplicating.
        record.revoke("chat.use");
        store.update_member_permission(&record).await.unwrap();
        let loaded = store
            .get_member_permission("u1", EntityType::User)
            .await
            .unwrap();
        assert!(loaded.permissions.is_empty());
        assert_eq!(member_rows(&store).await, 1);
    }

    #[tokio::test]
    async fn test_group_get_or_create_and_update() {
        let store = store().await;

        let created = store.get_permission_group("vip").await.unwrap();
        assert!(created.permissions.is_empty());

        let mut group = PermissionGroupRecord::new("vip");
        group.grant("chat.use").unwrap();
        store.update_permission_group(&group).await.unwrap();

        let loaded = store.get_permission_group("vip").await.unwrap();
        assert_eq!(loaded, group);
    }

    #[tokio::test]
    async fn test_exists_does_not_create() {
        let store = store().await;

        assert!(!store.permission_group_exists("ghost").await.unwrap());
        assert!(store.find_permission_group("ghost").await.unwrap().is_none());

        store.get_permission_group("vip").await.unwrap();
        assert!(store.permission_group_exists("vip").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_member_does_not_create() {
        let store = store().await;

        assert!(store
            .find_member_permission("u1", EntityType::User)
            .await
            .unwrap()
            .is_none());
        assert_eq!(member_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn test_delete_permission_group() {
        let store = store().await;

        store.get_permission_group("vip").await.unwrap();
        assert!(store.delete_permission_group("vip").await.unwrap());
        assert!(!store.delete_permission_group("vip").await.unwrap());
        assert!(!store.permission_group_exists("vip").await.unwrap());
    }

    #[tokio::test]
    async fn test_listings() {
        let store = store().await;

        store.get_permission_group("b").await.unwrap();
        store.get_permission_group("a").await.unwrap();
        store.get_member_permission("u1", EntityType::User).await.unwrap();
        store.get_member_permission("g1", EntityType::Group).await.unwrap();

        let groups = store.list_permission_groups().await.unwrap();
        assert_eq!(
            groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let users = store.list_member_permissions(EntityType::User).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].entity, EntityKey::user("u1"));
    }

    #[tokio::test]
    async fn test_closed_pool_is_retryable_error() {
        let store = store().await;
        store.pool().close().await;

        let err = store
            .get_member_permission("u1", EntityType::User)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
