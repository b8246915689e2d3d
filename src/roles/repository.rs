//! Role repository collaborators.
//!
//! The engine consumes roles through the [`RoleRepository`] trait; the
//! persistence layer behind it (database, directory, flat file) is out of
//! scope here. The repository also exposes a monotonically increasing
//! version counter, incremented by the role-management side on any
//! create/update/delete, which the snapshot cache polls to detect
//! staleness cheaply.
//!
//! [`MemoryRoleRepository`] is the in-process implementation used for
//! embedded deployments and throughout the test suite.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use super::{Role, RoleId};

/// Errors surfaced by a role repository.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// The backing store could not be reached. The cache recovers locally
    /// by serving its last known-good snapshot.
    #[error("role repository unavailable: {0}")]
    Unavailable(String),
}

/// Source of roles and of the version counter the cache polls.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Load every role, rule sets included.
    async fn load_roles(&self) -> Result<Vec<Arc<Role>>, RepositoryError>;

    /// Current value of the role-mutation version counter.
    async fn current_version(&self) -> Result<u64, RepositoryError>;
}

/// In-memory role store with version tracking.
///
/// Every mutation bumps the version counter, so a snapshot cache polling
/// [`RoleRepository::current_version`] observes the change within its
/// staleness window. Safe for concurrent use.
#[derive(Default)]
pub struct MemoryRoleRepository {
    roles: DashMap<RoleId, Arc<Role>>,
    version: AtomicU64,
}

impl MemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role, bumping the version counter.
    pub fn upsert_role(&self, role: Role) -> RoleId {
        let id = role.id();
        self.roles.insert(id, Arc::new(role));
        self.version.fetch_add(1, Ordering::SeqCst);
        id
    }

    /// Remove a role, bumping the version counter if it existed.
    pub fn remove_role(&self, id: RoleId) -> bool {
        let removed = self.roles.remove(&id).is_some();
        if removed {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }
}

#[async_trait]
impl RoleRepository for MemoryRoleRepository {
    async fn load_roles(&self) -> Result<Vec<Arc<Role>>, RepositoryError> {
        Ok(self.roles.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn current_version(&self) -> Result<u64, RepositoryError> {
        Ok(self.version.load(Ordering::SeqCst))
    }
}
