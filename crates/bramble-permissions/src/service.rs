//! Cached permission data service
//!
//! One explicitly constructed [`PermissionService`] is shared by reference
//! across the process (no lazily initialized globals). It fronts the SQLite
//! store with two keyed caches (member records by `(id, kind)`, permission
//! groups by name) and is the only path through which cached permission
//! data may be read or mutated.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use bramble_cache::{CacheError, CacheSource, KeyedCache};
use bramble_domain::{EntityKey, EntityType, MemberPermissionRecord, PermissionGroupRecord};
use bramble_storage::{PermissionStore, StorageError};

use crate::error::{Error, Result};

struct MemberSource {
    store: Arc<PermissionStore>,
}

#[async_trait]
impl CacheSource for MemberSource {
    type Key = EntityKey;
    type Value = MemberPermissionRecord;
    type Error = StorageError;

    async fn load(&self, key: &EntityKey) -> std::result::Result<Self::Value, StorageError> {
        self.store.get_member_permission(&key.id, key.kind).await
    }

    async fn reload(
        &self,
        key: &EntityKey,
    ) -> std::result::Result<Option<Self::Value>, StorageError> {
        self.store.find_member_permission(&key.id, key.kind).await
    }
}

struct GroupSource {
    store: Arc<PermissionStore>,
}

#[async_trait]
impl CacheSource for GroupSource {
    type Key = String;
    type Value = PermissionGroupRecord;
    type Error = StorageError;

    async fn load(&self, key: &String) -> std::result::Result<Self::Value, StorageError> {
        self.store.get_permission_group(key).await
    }

    async fn reload(
        &self,
        key: &String,
    ) -> std::result::Result<Option<Self::Value>, StorageError> {
        self.store.find_permission_group(key).await
    }
}

/// Cached access to permission records plus the admin mutation surface
pub struct PermissionService {
    store: Arc<PermissionStore>,
    members: KeyedCache<MemberSource>,
    groups: KeyedCache<GroupSource>,
}

impl PermissionService {
    /// Build a service over an opened store
    pub fn new(store: Arc<PermissionStore>) -> Self {
        Self {
            members: KeyedCache::new(MemberSource {
                store: Arc::clone(&store),
            }),
            groups: KeyedCache::new(GroupSource {
                store: Arc::clone(&store),
            }),
            store,
        }
    }

    /// Open the database at `url` and build a service over it
    pub async fn connect(url: &str) -> Result<Self> {
        let store = PermissionStore::connect(url).await?;
        Ok(Self::new(Arc::new(store)))
    }

    /// The underlying store
    pub fn store(&self) -> &PermissionStore {
        &self.store
    }

    /// Member record for `(id, kind)`, creating an empty one for never-seen
    /// entities. `no_cache` forces a store round-trip.
    pub async fn get_member_permission(
        &self,
        id: &str,
        kind: EntityType,
        no_cache: bool,
    ) -> Result<MemberPermissionRecord> {
        let key = EntityKey::new(id, kind);
        self.members
            .get(&key, no_cache)
            .await
            .map_err(|e| member_error(&key, e))
    }

    /// Permission group by name, creating an empty one for never-seen names.
    /// `no_cache` forces a store round-trip.
    pub async fn get_permission_group(
        &self,
        name: &str,
        no_cache: bool,
    ) -> Result<PermissionGroupRecord> {
        self.groups
            .get(&name.to_string(), no_cache)
            .await
            .map_err(|e| group_error(name, e))
    }

    /// Whether the named group exists; consults the cache first and never
    /// creates the group
    pub async fn permission_group_exists(&self, name: &str) -> Result<bool> {
        if self.groups.peek(&name.to_string()).await.is_some() {
            return Ok(true);
        }
        Ok(self.store.permission_group_exists(name).await?)
    }

    /// Persist a member record and replace its cached snapshot
    pub async fn update_member_permission(&self, record: MemberPermissionRecord) -> Result<()> {
        self.store.update_member_permission(&record).await?;
        debug!(entity = %record.entity, "member permission record updated");
        self.members.insert(record.entity.clone(), record).await;
        Ok(())
    }

    /// Persist a permission group and replace its cached snapshot
    pub async fn update_permission_group(&self, record: PermissionGroupRecord) -> Result<()> {
        self.store.update_permission_group(&record).await?;
        debug!(group = %record.name, "permission group updated");
        self.groups.insert(record.name.clone(), record).await;
        Ok(())
    }

    /// Force-reload a member record from the store. Errors when the record
    /// does not exist; refreshing never creates.
    pub async fn refresh_member_permission(
        &self,
        id: &str,
        kind: EntityType,
    ) -> Result<MemberPermissionRecord> {
        let key = EntityKey::new(id, kind);
        self.members
            .refresh(&key)
            .await
            .map_err(|e| member_error(&key, e))
    }

    /// Force-reload a permission group from the store. Errors when the group
    /// does not exist; refreshing never creates.
    pub async fn refresh_permission_group(&self, name: &str) -> Result<PermissionGroupRecord> {
        self.groups
            .refresh(&name.to_string())
            .await
            .map_err(|e| group_error(name, e))
    }

    /// Delete a group from the store and drop its cached snapshot; returns
    /// whether the group existed
    pub async fn delete_permission_group(&self, name: &str) -> Result<bool> {
        let deleted = self.store.delete_permission_group(name).await?;
        self.groups.invalidate(&name.to_string()).await;
        Ok(deleted)
    }

    /// Drop one member's cached snapshot
    pub async fn invalidate_member(&self, id: &str, kind: EntityType) {
        self.members.invalidate(&EntityKey::new(id, kind)).await;
    }

    /// Drop one group's cached snapshot
    pub async fn invalidate_group(&self, name: &str) {
        self.groups.invalidate(&name.to_string()).await;
    }

    /// Drop every cached snapshot (bulk admin reload)
    pub async fn invalidate_all(&self) {
        self.members.invalidate_all().await;
        self.groups.invalidate_all().await;
    }

    /// Warm both caches from the store in one pass
    pub async fn preload(&self) -> Result<()> {
        for group in self.store.list_permission_groups().await? {
            self.groups.insert(group.name.clone(), group).await;
        }
        for kind in [EntityType::User, EntityType::Group] {
            for member in self.store.list_member_permissions(kind).await? {
                self.members.insert(member.entity.clone(), member).await;
            }
        }
        Ok(())
    }

    /// All stored permission groups, straight from the store
    pub async fn list_permission_groups(&self) -> Result<Vec<PermissionGroupRecord>> {
        Ok(self.store.list_permission_groups().await?)
    }

    /// All stored member records of one kind, straight from the store
    pub async fn list_member_permissions(
        &self,
        kind: EntityType,
    ) -> Result<Vec<MemberPermissionRecord>> {
        Ok(self.store.list_member_permissions(kind).await?)
    }

    /// `(member, group)` cache entry counts, for monitoring
    pub async fn cache_size(&self) -> (usize, usize) {
        (self.members.len().await, self.groups.len().await)
    }
}

fn member_error(key: &EntityKey, err: CacheError<StorageError>) -> Error {
    match err {
        CacheError::NotFound { .. } => Error::MemberNotFound {
            id: key.id.clone(),
            kind: key.kind,
        },
        CacheError::Source(e) => Error::Storage(e),
    }
}

fn group_error(name: &str, err: CacheError<StorageError>) -> Error {
    match err {
        CacheError::NotFound { .. } => Error::GroupNotFound {
            name: name.to_string(),
        },
        CacheError::Source(e) => Error::Storage(e),
    }
}
