//! Effective-permission resolution
//!
//! Answers "may this entity use this node" by combining direct grants with
//! permission-group memberships. Results are memoized per entity and node so
//! that the many rule evaluations triggered by a single inbound event cost
//! one store round-trip at most; the memo entries an event produced are
//! dropped when that event finishes processing.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use bramble_domain::EntityType;

use crate::error::Result;
use crate::event::{EventId, EventPermissionTracker};
use crate::service::PermissionService;

/// Permission checks for users and groups, memoized per inbound event
pub struct PermissionResolver {
    service: Arc<PermissionService>,
    user_results: DashMap<(String, String), bool>,
    group_results: DashMap<(String, String, bool), bool>,
    tracker: EventPermissionTracker,
}

impl PermissionResolver {
    /// Build a resolver over a shared service
    pub fn new(service: Arc<PermissionService>) -> Self {
        Self {
            service,
            user_results: DashMap::new(),
            group_results: DashMap::new(),
            tracker: EventPermissionTracker::new(),
        }
    }

    /// The shared data service
    pub fn service(&self) -> &Arc<PermissionService> {
        &self.service
    }

    /// The per-event usage mapping
    pub fn tracker(&self) -> &EventPermissionTracker {
        &self.tracker
    }

    /// Effective permission check for a user.
    ///
    /// Direct permissions decide first; when they do not grant, each of the
    /// user's permission groups is consulted in membership order. Group names
    /// without a stored group are skipped. The result is memoized under
    /// `(user_id, node)` until `event`'s cleanup runs.
    pub async fn check_user(&self, event: EventId, user_id: &str, node: &str) -> Result<bool> {
        self.tracker.record_user(event, user_id, node);

        let memo_key = (user_id.to_string(), node.to_string());
        if let Some(hit) = self.user_results.get(&memo_key) {
            return Ok(*hit);
        }

        let member = self
            .service
            .get_member_permission(user_id, EntityType::User, false)
            .await?;
        let mut allowed = member.permission_set().check(node);
        if !allowed {
            allowed = self
                .check_member_groups(&member.permission_groups, user_id, node)
                .await?;
        }

        debug!(user = user_id, node, allowed, "user permission check");
        self.user_results.insert(memo_key, allowed);
        Ok(allowed)
    }

    /// Effective permission check for a group-scoped event.
    ///
    /// `group_id` is `None` for events without a group context. Those pass
    /// unconditionally when `only_group` is false and always fail when it is
    /// true. The result is memoized under `(group_id, node, only_group)`
    /// until `event`'s cleanup runs.
    pub async fn check_group(
        &self,
        event: EventId,
        group_id: Option<&str>,
        node: &str,
        only_group: bool,
    ) -> Result<bool> {
        let Some(group_id) = group_id else {
            if only_group {
                return Ok(false);
            }
            // Non-group contexts are exempt from group gating. Logged because
            // a pass without any lookup is easy to misread in the field.
            warn!(node, "group permission check passed open for non-group event");
            return Ok(true);
        };

        self.tracker.record_group(event, group_id, node);

        let memo_key = (group_id.to_string(), node.to_string(), only_group);
        if let Some(hit) = self.group_results.get(&memo_key) {
            return Ok(*hit);
        }

        let member = self
            .service
            .get_member_permission(group_id, EntityType::Group, false)
            .await?;
        let mut allowed = member.permission_set().check(node);
        if !allowed {
            allowed = self
                .check_member_groups(&member.permission_groups, group_id, node)
                .await?;
        }

        debug!(group = group_id, node, allowed, only_group, "group permission check");
        self.group_results.insert(memo_key, allowed);
        Ok(allowed)
    }

    /// Whether any permission group in `names` grants `node`
    async fn check_member_groups(
        &self,
        names: &[String],
        entity_id: &str,
        node: &str,
    ) -> Result<bool> {
        for name in names {
            if !self.service.permission_group_exists(name).await? {
                warn!(group = %name, entity = entity_id, "skipping missing permission group");
                continue;
            }
            let group = self.service.get_permission_group(name, false).await?;
            if group.permission_set().check(node) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drop the memoized results recorded for `event` and its mapping entry.
    ///
    /// Idempotent: an unknown or already-expired id returns immediately.
    /// For group pairs both `only_group` variants are dropped since either
    /// may have been memoized.
    pub fn expire_event_cache(&self, event: EventId) {
        let Some(touches) = self.tracker.drain(event) else {
            return;
        };

        for key in touches.users {
            self.user_results.remove(&key);
        }
        for (group_id, node) in touches.groups {
            for only_group in [true, false] {
                self.group_results
                    .remove(&(group_id.clone(), node.clone(), only_group));
            }
        }
        debug!(event = %event, "expired event-scoped permission cache");
    }

    /// Number of memoized check results currently held
    pub fn memoized_checks(&self) -> usize {
        self.user_results.len() + self.group_results.len()
    }
}
