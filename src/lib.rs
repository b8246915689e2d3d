//! Hierarchical role-based authorization engine.
//!
//! Given an authenticated principal and a slash-delimited resource path,
//! the engine decides allow/deny by combining the rule sets of every role
//! the principal belongs to: longest-ancestor-prefix resolution within a
//! role, OR-merge across roles, default deny everywhere else. Compiled
//! per-role resolvers are served from a process-wide snapshot cache with
//! a bounded staleness window, invalidated by the role repository's
//! version counter or forced expiry after a role mutation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use palisade::{
//!     AccessConfig, AccessControlService, MemberList, MemoryRoleRepository, PermissionState,
//!     Principal, Role, RoleRuleSet,
//! };
//! use palisade::audit::{MemoryAuditSink, SystemClock};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Arc::new(MemoryRoleRepository::new());
//! let mut rules = RoleRuleSet::new();
//! rules.insert_recursive("/ca", PermissionState::Allow)?;
//! rules.insert_recursive("/ca/secrets", PermissionState::Deny)?;
//! repo.upsert_role(Role::new(
//!     "ca-operators",
//!     rules,
//!     Arc::new(MemberList::new(["alice"])),
//! ));
//!
//! let service = AccessControlService::new(
//!     &AccessConfig::default(),
//!     repo,
//!     Arc::new(SystemClock),
//!     Arc::new(MemoryAuditSink::new()),
//! );
//!
//! let alice = Principal::named("alice");
//! assert!(service.is_authorized(&alice, "/ca/issue").await?);
//! assert!(!service.is_authorized(&alice, "/ca/secrets/hsm").await?);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod authz;
pub mod config;
pub mod observability;
pub mod roles;

#[cfg(test)]
mod tests;

pub use audit::{AuditKind, AuditRecord, AuditSink, TrustedClock};
pub use authz::{
    AccessControlService, AccessDecisionEngine, AccessTreeCache, AuthzError, PermissionState,
    RoleRuleSet, merge_total_access,
};
pub use config::AccessConfig;
pub use roles::{
    MemberList, MembershipPredicate, MemoryRoleRepository, Principal, Role, RoleId, RoleRepository,
};
