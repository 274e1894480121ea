//! Group and member permission records
//!
//! These are the snapshots exchanged between the storage layer, the caches,
//! and admin commands. They carry raw node strings; parsing happens when a
//! [`PermissionSet`] is built for evaluation.

use serde::{Deserialize, Serialize};

use crate::entity::EntityKey;
use crate::error::Result;
use crate::node::{NodeEntry, PermissionSet};

/// A named bundle of permission nodes entities can join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroupRecord {
    /// Unique group name
    pub name: String,
    /// Stored permission entries, in admin-assigned order
    pub permissions: Vec<String>,
}

impl PermissionGroupRecord {
    /// Create an empty group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
        }
    }

    /// Parsed view of this group's permissions
    pub fn permission_set(&self) -> PermissionSet {
        PermissionSet::from_nodes(&self.permissions)
    }

    /// Add a node after validating it; duplicates are kept out
    pub fn grant(&mut self, node: &str) -> Result<()> {
        NodeEntry::parse(node)?;
        if !self.permissions.iter().any(|n| n == node) {
            self.permissions.push(node.to_string());
        }
        Ok(())
    }

    /// Remove a node; returns whether it was present
    pub fn revoke(&mut self, node: &str) -> bool {
        let before = self.permissions.len();
        self.permissions.retain(|n| n != node);
        self.permissions.len() != before
    }
}

/// Per-entity permission record: direct nodes plus group memberships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPermissionRecord {
    /// The user or group this record belongs to
    pub entity: EntityKey,
    /// Directly assigned permission entries
    pub permissions: Vec<String>,
    /// Names of permission groups this entity belongs to
    pub permission_groups: Vec<String>,
}

impl MemberPermissionRecord {
    /// Create an empty record for an entity
    pub fn new(entity: EntityKey) -> Self {
        Self {
            entity,
            permissions: Vec::new(),
            permission_groups: Vec::new(),
        }
    }

    /// Parsed view of the directly assigned permissions
    pub fn permission_set(&self) -> PermissionSet {
        PermissionSet::from_nodes(&self.permissions)
    }

    /// Add a node after validating it; duplicates are kept out
    pub fn grant(&mut self, node: &str) -> Result<()> {
        NodeEntry::parse(node)?;
        if !self.permissions.iter().any(|n| n == node) {
            self.permissions.push(node.to_string());
        }
        Ok(())
    }

    /// Remove a node; returns whether it was present
    pub fn revoke(&mut self, node: &str) -> bool {
        let before = self.permissions.len();
        self.permissions.retain(|n| n != node);
        self.permissions.len() != before
    }

    /// Whether the entity belongs to the named group
    pub fn in_group(&self, name: &str) -> bool {
        self.permission_groups.iter().any(|g| g == name)
    }

    /// Join a group; returns false when already a member
    pub fn join_group(&mut self, name: &str) -> bool {
        if self.in_group(name) {
            return false;
        }
        self.permission_groups.push(name.to_string());
        true
    }

    /// Leave a group; returns whether the entity was a member
    pub fn leave_group(&mut self, name: &str) -> bool {
        let before = self.permission_groups.len();
        self.permission_groups.retain(|g| g != name);
        self.permission_groups.len() != before
    }
}
