//! Hierarchical role-based authorization.
//!
//! The authorization flow:
//! 1. Canonicalize the queried resource path
//! 2. Refresh the snapshot cache per the staleness policy
//! 3. Evaluate each role's membership predicate against the principal
//! 4. OR the matching roles' resolutions of the resource
//! 5. Emit audit records for grants and authentication failures
//!
//! Rule semantics live in [`RoleRuleSet`]: longest-ancestor-prefix
//! resolution with a default deny, plus the normalization, minimization,
//! and OR-merge algorithms. [`AccessTreeCache`] owns the compiled
//! snapshots and their bounded-staleness lifecycle;
//! [`AccessControlService`] is the public entry point.

mod cache;
mod engine;
mod error;
pub mod path;
mod rules;
mod service;
mod tree;

pub use cache::{AccessSnapshot, AccessTreeCache, CompiledRole};
pub use engine::AccessDecisionEngine;
pub use error::AuthzError;
pub use path::PathError;
pub use rules::{AccessRule, PermissionState, RoleRuleSet, merge_total_access};
pub use service::AccessControlService;
pub use tree::CompiledAccessTree;
