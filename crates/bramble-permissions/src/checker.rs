//! Rule-facing permission checkers
//!
//! The bot framework's rule layer evaluates one of these before running a
//! command or message handler. Checkers are plain values registered by name
//! in a [`CheckerRegistry`] during startup; nothing is registered as an
//! import-time side effect.
//!
//! `check` surfaces store failures to the caller; `passes` is the boundary
//! wrapper that logs them and answers `false`, so a user never sees the
//! difference between "denied" and "lookup failed" while operators do.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::event::EventId;
use crate::resolver::PermissionResolver;

/// Identity and scope of one inbound event, captured at ingress
#[derive(Debug, Clone)]
pub struct EventContext {
    /// Identifier used for event-scoped cache cleanup
    pub event_id: EventId,
    /// The sending user
    pub user_id: String,
    /// The group the event happened in, when it is group-scoped
    pub group_id: Option<String>,
}

impl EventContext {
    /// Context for a direct (non-group) event
    pub fn direct(user_id: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(),
            user_id: user_id.into(),
            group_id: None,
        }
    }

    /// Context for a group-scoped event
    pub fn group(user_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(),
            user_id: user_id.into(),
            group_id: Some(group_id.into()),
        }
    }

    /// Whether the event carries a group scope
    pub fn is_group_event(&self) -> bool {
        self.group_id.is_some()
    }
}

/// Gate on the sending user holding a permission node
#[derive(Debug, Clone)]
pub struct UserPermissionChecker {
    permission: String,
}

impl UserPermissionChecker {
    /// Checker for one permission node
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
        }
    }

    /// The node this checker gates on
    pub fn permission(&self) -> &str {
        &self.permission
    }

    /// Run the check, surfacing store failures
    pub async fn check(&self, resolver: &PermissionResolver, ctx: &EventContext) -> Result<bool> {
        resolver
            .check_user(ctx.event_id, &ctx.user_id, &self.permission)
            .await
    }

    /// Rule-boundary form: `false` on denial or failure, with logs telling
    /// the two apart
    pub async fn passes(&self, resolver: &PermissionResolver, ctx: &EventContext) -> bool {
        checker_verdict(self.check(resolver, ctx).await, &self.permission, ctx)
    }
}

/// Gate on the event's group holding a permission node
#[derive(Debug, Clone)]
pub struct GroupPermissionChecker {
    permission: String,
    only_group: bool,
}

impl GroupPermissionChecker {
    /// Checker for one permission node. With `only_group` set, events
    /// without a group context always fail; without it they are exempt from
    /// the check.
    pub fn new(permission: impl Into<String>, only_group: bool) -> Self {
        Self {
            permission: permission.into(),
            only_group,
        }
    }

    /// The node this checker gates on
    pub fn permission(&self) -> &str {
        &self.permission
    }

    /// Whether this checker requires a group context
    pub fn only_group(&self) -> bool {
        self.only_group
    }

    /// Run the check, surfacing store failures
    pub async fn check(&self, resolver: &PermissionResolver, ctx: &EventContext) -> Result<bool> {
        resolver
            .check_group(
                ctx.event_id,
                ctx.group_id.as_deref(),
                &self.permission,
                self.only_group,
            )
            .await
    }

    /// Rule-boundary form: `false` on denial or failure, with logs telling
    /// the two apart
    pub async fn passes(&self, resolver: &PermissionResolver, ctx: &EventContext) -> bool {
        checker_verdict(self.check(resolver, ctx).await, &self.permission, ctx)
    }
}

fn checker_verdict(result: Result<bool>, permission: &str, ctx: &EventContext) -> bool {
    match result {
        Ok(allowed) => {
            if !allowed {
                debug!(permission, user = %ctx.user_id, "permission denied");
            }
            allowed
        }
        Err(e) => {
            // Fail closed, but keep the failure distinguishable in logs.
            error!(permission, user = %ctx.user_id, error = %e, "permission check failed");
            false
        }
    }
}

/// A checker held by the registry
#[derive(Debug, Clone)]
pub enum RegisteredChecker {
    User(UserPermissionChecker),
    Group(GroupPermissionChecker),
}

impl RegisteredChecker {
    /// Run the underlying check, surfacing store failures
    pub async fn check(&self, resolver: &PermissionResolver, ctx: &EventContext) -> Result<bool> {
        match self {
            RegisteredChecker::User(c) => c.check(resolver, ctx).await,
            RegisteredChecker::Group(c) => c.check(resolver, ctx).await,
        }
    }

    /// Rule-boundary form of the underlying check
    pub async fn passes(&self, resolver: &PermissionResolver, ctx: &EventContext) -> bool {
        match self {
            RegisteredChecker::User(c) => c.passes(resolver, ctx).await,
            RegisteredChecker::Group(c) => c.passes(resolver, ctx).await,
        }
    }
}

/// Named checkers, registered during startup and looked up by the rule layer
#[derive(Debug, Default)]
pub struct CheckerRegistry {
    checkers: HashMap<String, RegisteredChecker>,
}

impl CheckerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            checkers: HashMap::new(),
        }
    }

    /// Register a checker under a unique name
    pub fn register(&mut self, name: impl Into<String>, checker: RegisteredChecker) -> Result<()> {
        let name = name.into();
        if self.checkers.contains_key(&name) {
            return Err(Error::CheckerAlreadyRegistered(name));
        }
        self.checkers.insert(name, checker);
        Ok(())
    }

    /// Look up a checker by name
    pub fn lookup(&self, name: &str) -> Option<&RegisteredChecker> {
        self.checkers.get(name)
    }

    /// Registered names, unordered
    pub fn names(&self) -> Vec<&str> {
        self.checkers.keys().map(String::as_str).collect()
    }

    /// Number of registered checkers
    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}
