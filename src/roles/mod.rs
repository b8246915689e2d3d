//! Roles, principals, and membership predicates.
//!
//! A [`Role`] is a named bundle of access rules plus a membership
//! predicate over principals. The engine never inspects a predicate's
//! internals; it only asks "does this principal belong to this role?".
//! Matching a principal's credential attributes against roles is the
//! predicate's business — two common predicates ship with the crate, and
//! deployments plug in their own via the [`MembershipPredicate`] trait.

mod repository;

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use repository::{MemoryRoleRepository, RepositoryError, RoleRepository};

use crate::authz::RoleRuleSet;

/// Opaque role identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The authenticated actor presenting an authorization query.
///
/// Carries the subject name plus a flat map of credential attributes
/// (certificate serial, issuer DN, token claims — whatever the
/// authentication layer extracted). Predicates match against these;
/// the engine itself only forwards them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    subject: String,
    attributes: HashMap<String, String>,
}

impl Principal {
    pub fn named(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Errors raised while evaluating a membership predicate.
#[derive(Debug, Clone, Error)]
pub enum MembershipError {
    /// The principal's credential could not itself be validated (stale or
    /// malformed). Distinguished from an ordinary non-match so the caller
    /// can audit it as an authentication failure rather than a deny.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Decides whether a principal belongs to a role.
pub trait MembershipPredicate: Send + Sync {
    fn matches(&self, principal: &Principal) -> Result<bool, MembershipError>;
}

/// Matches principals carrying a credential attribute equal to a fixed
/// value.
#[derive(Debug, Clone)]
pub struct AttributeEquals {
    key: String,
    value: String,
}

impl AttributeEquals {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl MembershipPredicate for AttributeEquals {
    fn matches(&self, principal: &Principal) -> Result<bool, MembershipError> {
        Ok(principal.attribute(&self.key) == Some(self.value.as_str()))
    }
}

/// Matches principals by explicit subject name.
#[derive(Debug, Clone, Default)]
pub struct MemberList {
    subjects: Vec<String>,
}

impl MemberList {
    pub fn new(subjects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }
}

impl MembershipPredicate for MemberList {
    fn matches(&self, principal: &Principal) -> Result<bool, MembershipError> {
        Ok(self.subjects.iter().any(|s| s == principal.subject()))
    }
}

/// A named bundle of access rules plus a membership predicate.
#[derive(Clone)]
pub struct Role {
    id: RoleId,
    name: String,
    namespace: Option<String>,
    rules: RoleRuleSet,
    membership: Arc<dyn MembershipPredicate>,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        rules: RoleRuleSet,
        membership: Arc<dyn MembershipPredicate>,
    ) -> Self {
        Self {
            id: RoleId::new(),
            name: name.into(),
            namespace: None,
            rules,
            membership,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn id(&self) -> RoleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn rules(&self) -> &RoleRuleSet {
        &self.rules
    }

    /// Evaluate this role's membership predicate.
    pub fn matches(&self, principal: &Principal) -> Result<bool, MembershipError> {
        self.membership.matches(principal)
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Role")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}
