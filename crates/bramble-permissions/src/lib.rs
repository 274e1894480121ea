//! Permission evaluation for bramble
//!
//! Composes the domain model, persistent store, and cache layer into the
//! checks the bot's rule layer runs before a handler fires:
//!
//! - [`PermissionService`]: cached access to member records and permission
//!   groups, plus the admin mutation surface.
//! - [`PermissionResolver`]: effective-permission checks for users and
//!   groups, memoized for the lifetime of a single inbound event.
//! - [`EventPermissionTracker`] / [`EventId`]: tracks which memoized
//!   results each event produced so end-of-event cleanup can drop exactly
//!   those.
//! - [`UserPermissionChecker`] / [`GroupPermissionChecker`]: the rule-facing
//!   boundary, registered by name in a [`CheckerRegistry`] at startup.

pub mod checker;
pub mod error;
pub mod event;
pub mod resolver;
pub mod service;

pub use checker::{
    CheckerRegistry, EventContext, GroupPermissionChecker, RegisteredChecker,
    UserPermissionChecker,
};
pub use error::{Error, Result};
pub use event::{EventId, EventPermissionTracker};
pub use resolver::PermissionResolver;
pub use service::PermissionService;
