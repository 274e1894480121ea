//! Entities that permissions are evaluated against

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The two kinds of subject a permission check can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// An individual chat user
    User,
    /// A chat group
    Group,
}

impl EntityType {
    /// Stable string form used in the database `type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Group => "group",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityType::User),
            "group" => Ok(EntityType::Group),
            other => Err(Error::UnknownEntityType(other.to_string())),
        }
    }
}

/// Composite key identifying a member record: `(id, kind)` is unique
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Platform-assigned identifier (user id or group id)
    pub id: String,
    /// Whether the id names a user or a group
    pub kind: EntityType,
}

impl EntityKey {
    /// Create a key for an arbitrary entity
    pub fn new(id: impl Into<String>, kind: EntityType) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Key for a user entity
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, EntityType::User)
    }

    /// Key for a group entity
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, EntityType::Group)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
