//! Core permission model for bramble
//!
//! Defines the permission-node grammar (dotted paths, subtree wildcards,
//! deny prefixes), the matching rules used by every permission check, and
//! the group/member records shared by the storage and resolution layers.

pub mod entity;
pub mod error;
pub mod node;
pub mod record;

pub use entity::{EntityKey, EntityType};
pub use error::{Error, Result};
pub use node::{NodeEntry, PermissionSet};
pub use record::{MemberPermissionRecord, PermissionGroupRecord};
