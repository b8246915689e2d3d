//! Process-wide snapshot cache of compiled per-role resolvers.
//!
//! The cache publishes an immutable [`AccessSnapshot`] through an
//! atomically swapped pointer. Readers on the hot path never block: they
//! load the current snapshot and use it for the whole query, while a
//! rebuild publishes its replacement wholesale. A snapshot held by an
//! in-flight reader stays valid until the last reference drops.
//!
//! Staleness is bounded by a TTL plus a version counter maintained by the
//! role-management side:
//!
//! - within the TTL the snapshot is served directly (FRESH);
//! - after the TTL one caller re-checks the repository's version counter
//!   (STALE-UNVERIFIED) — unchanged means the TTL clock restarts without
//!   recompiling anything, changed means rebuild;
//! - [`AccessTreeCache::force_expire`] marks the snapshot invalid
//!   outright, so administrators observe their own role changes on the
//!   very next query instead of waiting out the staleness window.
//!
//! A rebuild that fails (repository unreachable, or slower than the
//! rebuild timeout) is logged and abandoned; the last known-good snapshot
//! keeps serving and the next query retries.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{
    rules::{RoleRuleSet, merge_total_access},
    tree::CompiledAccessTree,
};
use crate::{
    config::CacheSettings,
    roles::{Role, RoleId, RoleRepository},
};

/// A role paired with its compiled resolver.
pub struct CompiledRole {
    role: Arc<Role>,
    tree: CompiledAccessTree,
    fully_recursive: bool,
}

impl CompiledRole {
    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn tree(&self) -> &CompiledAccessTree {
        &self.tree
    }

    /// Whether the source rule set is mergeable without changing any
    /// resolution (see [`RoleRuleSet::is_fully_recursive`]).
    pub fn fully_recursive(&self) -> bool {
        self.fully_recursive
    }
}

/// Immutable compiled view of the role set at one repository version.
///
/// Never mutated in place — the cache replaces the whole snapshot. The
/// only interior mutability is the merged-tree memo, which is append-only
/// derived data keyed by role combination.
pub struct AccessSnapshot {
    roles: Vec<CompiledRole>,
    version: u64,
    merged: DashMap<Vec<RoleId>, Arc<CompiledAccessTree>>,
}

impl AccessSnapshot {
    pub(crate) fn compile(roles: &[Arc<Role>], version: u64) -> Self {
        Self {
            roles: roles
                .iter()
                .map(|role| CompiledRole {
                    tree: CompiledAccessTree::compile(role.rules()),
                    fully_recursive: role.rules().is_fully_recursive(),
                    role: role.clone(),
                })
                .collect(),
            version,
            merged: DashMap::new(),
        }
    }

    /// Snapshot with no roles: every query resolves to deny.
    pub(crate) fn empty() -> Self {
        Self::compile(&[], 0)
    }

    /// Repository version this snapshot was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub(crate) fn roles(&self) -> &[CompiledRole] {
        &self.roles
    }

    /// OR-merged resolver for a combination of matching roles, memoized
    /// per sorted role-id key. Callers guarantee `matching` is non-empty.
    pub(crate) fn merged_tree(&self, matching: &[&CompiledRole]) -> Arc<CompiledAccessTree> {
        let mut key: Vec<RoleId> = matching.iter().map(|c| c.role.id()).collect();
        key.sort();
        if let Some(tree) = self.merged.get(&key) {
            return tree.clone();
        }

        let mut combined: RoleRuleSet = matching[0].role.rules().clone();
        for compiled in &matching[1..] {
            combined = merge_total_access(&combined, compiled.role.rules());
        }
        let tree = Arc::new(CompiledAccessTree::compile(&combined));
        self.merged.insert(key, tree.clone());
        tree
    }
}

/// Version-counter-invalidated cache of compiled access snapshots.
pub struct AccessTreeCache {
    repo: Arc<dyn RoleRepository>,
    current: ArcSwapOption<AccessSnapshot>,
    ttl: Duration,
    rebuild_timeout: Duration,
    /// Baseline for the monotonic millisecond clock in `verified_at_ms`.
    epoch: Instant,
    /// When the snapshot's version was last verified against the
    /// repository, in milliseconds since `epoch`.
    verified_at_ms: AtomicU64,
    /// Forced-invalid flag set by `force_expire`.
    expired: AtomicBool,
    /// Rebuild gate: the forced path locks it, the TTL path only
    /// try-locks so stale readers never wait on a rebuild in flight.
    rebuild_gate: Mutex<()>,
}

impl AccessTreeCache {
    pub fn new(settings: &CacheSettings, repo: Arc<dyn RoleRepository>) -> Self {
        Self {
            repo,
            current: ArcSwapOption::empty(),
            ttl: settings.ttl(),
            rebuild_timeout: settings.rebuild_timeout(),
            epoch: Instant::now(),
            verified_at_ms: AtomicU64::new(0),
            expired: AtomicBool::new(false),
            rebuild_gate: Mutex::new(()),
        }
    }

    /// Current snapshot, refreshed per the staleness policy.
    ///
    /// With no snapshot built yet and the repository unreachable, an
    /// empty (deny-everything) snapshot is returned; queries fail closed
    /// rather than failing.
    pub async fn snapshot(&self) -> Arc<AccessSnapshot> {
        if self.expired.load(Ordering::Acquire) {
            // Forced invalidation: the next query must observe the new
            // role set, so this path blocks on the gate.
            let _gate = self.rebuild_gate.lock().await;
            if self.expired.load(Ordering::Acquire) {
                self.rebuild().await;
            }
        } else if let Some(snapshot) = self.current.load_full() {
            let age = Duration::from_millis(
                self.now_ms()
                    .saturating_sub(self.verified_at_ms.load(Ordering::Acquire)),
            );
            if age >= self.ttl {
                // Stale-unverified: one caller re-checks the version
                // counter; losers of the gate proceed on the
                // stale-but-valid snapshot.
                if let Ok(_gate) = self.rebuild_gate.try_lock() {
                    self.verify_or_rebuild(&snapshot).await;
                }
            }
        } else {
            // Cold start: first caller builds, concurrent callers fall
            // through to the empty snapshot.
            if let Ok(_gate) = self.rebuild_gate.try_lock() {
                if self.current.load().is_none() {
                    self.rebuild().await;
                }
            }
        }

        self.current
            .load_full()
            .unwrap_or_else(|| Arc::new(AccessSnapshot::empty()))
    }

    /// Invalidate the snapshot regardless of TTL. Called by the
    /// role-management side immediately after any role mutation.
    pub fn force_expire(&self) {
        self.expired.store(true, Ordering::Release);
    }

    /// Re-check the repository's version counter for a stale snapshot.
    async fn verify_or_rebuild(&self, snapshot: &AccessSnapshot) {
        match tokio::time::timeout(self.rebuild_timeout, self.repo.current_version()).await {
            Ok(Ok(version)) if version == snapshot.version() => {
                // Unchanged: back to FRESH without recompiling.
                self.touch();
                tracing::trace!(version, "access snapshot version unchanged");
            }
            Ok(Ok(version)) => {
                tracing::debug!(
                    cached = snapshot.version(),
                    current = version,
                    "access snapshot version changed, rebuilding"
                );
                self.rebuild().await;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "version check failed; serving last known-good snapshot");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.rebuild_timeout.as_millis() as u64,
                    "version check timed out; serving last known-good snapshot"
                );
            }
        }
    }

    /// Rebuild and publish a new snapshot. Failures are logged and leave
    /// the current snapshot (and the forced-invalid flag) untouched, so
    /// the next query retries.
    async fn rebuild(&self) {
        let loaded = tokio::time::timeout(self.rebuild_timeout, async {
            // Version first: a mutation landing between the two reads
            // leaves the snapshot tagged with the older version, which
            // the next staleness check treats as a mismatch. Staleness
            // detection stays conservative.
            let version = self.repo.current_version().await?;
            let roles = self.repo.load_roles().await?;
            Ok::<_, crate::roles::RepositoryError>((version, roles))
        })
        .await;

        match loaded {
            Ok(Ok((version, roles))) => {
                let snapshot = AccessSnapshot::compile(&roles, version);
                let role_count = snapshot.role_count();
                self.current.store(Some(Arc::new(snapshot)));
                self.expired.store(false, Ordering::Release);
                self.touch();
                tracing::debug!(roles = role_count, version, "published new access snapshot");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "access snapshot rebuild failed; serving last known-good snapshot");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.rebuild_timeout.as_millis() as u64,
                    "access snapshot rebuild timed out; serving last known-good snapshot"
                );
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self) {
        self.verified_at_ms.store(self.now_ms(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        authz::PermissionState,
        roles::{MemberList, MemoryRoleRepository, RepositoryError},
    };

    fn settings(ttl_ms: u64) -> CacheSettings {
        CacheSettings {
            ttl_ms,
            rebuild_timeout_ms: 1_000,
            memoize_merges: true,
        }
    }

    fn role_allowing(name: &str, resource: &str) -> Role {
        let mut rules = RoleRuleSet::new();
        rules
            .insert_recursive(resource, PermissionState::Allow)
            .unwrap();
        Role::new(name, rules, Arc::new(MemberList::new(["alice"])))
    }

    /// Repository wrapper whose availability can be switched off.
    struct FlakyRepository {
        inner: MemoryRoleRepository,
        available: AtomicBool,
    }

    impl FlakyRepository {
        fn new() -> Self {
            Self {
                inner: MemoryRoleRepository::new(),
                available: AtomicBool::new(true),
            }
        }

        fn set_available(&self, available: bool) {
            self.available.store(available, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), RepositoryError> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RepositoryError::Unavailable("switched off".to_string()))
            }
        }
    }

    #[async_trait]
    impl RoleRepository for FlakyRepository {
        async fn load_roles(&self) -> Result<Vec<Arc<Role>>, RepositoryError> {
            self.check()?;
            self.inner.load_roles().await
        }

        async fn current_version(&self) -> Result<u64, RepositoryError> {
            self.check()?;
            self.inner.current_version().await
        }
    }

    #[tokio::test]
    async fn test_first_query_builds_snapshot() {
        let repo = Arc::new(MemoryRoleRepository::new());
        repo.upsert_role(role_allowing("operators", "/ca"));
        let cache = AccessTreeCache::new(&settings(60_000), repo);

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.role_count(), 1);
        assert_eq!(snapshot.version(), 1);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_served_without_repo_contact() {
        let repo = Arc::new(FlakyRepository::new());
        repo.inner.upsert_role(role_allowing("operators", "/ca"));
        let cache = AccessTreeCache::new(&settings(60_000), repo.clone());

        let first = cache.snapshot().await;
        repo.set_available(false);
        // within the TTL the repository is not consulted at all
        let second = cache.snapshot().await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_stale_unverified_returns_to_fresh_without_recompiling() {
        let repo = Arc::new(MemoryRoleRepository::new());
        repo.upsert_role(role_allowing("operators", "/ca"));
        let cache = AccessTreeCache::new(&settings(10), repo);

        let first = cache.snapshot().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        // TTL elapsed, version unchanged: same snapshot object survives
        let second = cache.snapshot().await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_version_change_detected_after_ttl() {
        let repo = Arc::new(MemoryRoleRepository::new());
        repo.upsert_role(role_allowing("operators", "/ca"));
        let cache = AccessTreeCache::new(&settings(10), repo.clone());

        let first = cache.snapshot().await;
        repo.upsert_role(role_allowing("auditors", "/audit"));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let second = cache.snapshot().await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.role_count(), 2);
        assert_eq!(second.version(), 2);
    }

    #[tokio::test]
    async fn test_force_expire_takes_effect_on_next_query() {
        let repo = Arc::new(MemoryRoleRepository::new());
        repo.upsert_role(role_allowing("operators", "/ca"));
        // TTL long enough that only the forced path can explain a rebuild
        let cache = AccessTreeCache::new(&settings(60_000), repo.clone());

        let first = cache.snapshot().await;
        repo.upsert_role(role_allowing("auditors", "/audit"));
        assert_eq!(cache.snapshot().await.role_count(), 1);

        cache.force_expire();
        let fresh = cache.snapshot().await;
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(fresh.role_count(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_failure_keeps_last_known_good() {
        let repo = Arc::new(FlakyRepository::new());
        repo.inner.upsert_role(role_allowing("operators", "/ca"));
        let cache = AccessTreeCache::new(&settings(10), repo.clone());

        let good = cache.snapshot().await;
        assert_eq!(good.role_count(), 1);

        repo.inner.upsert_role(role_allowing("auditors", "/audit"));
        repo.set_available(false);
        tokio::time::sleep(Duration::from_millis(30)).await;

        // version check fails: last known-good keeps serving
        let served = cache.snapshot().await;
        assert!(Arc::ptr_eq(&good, &served));

        // forced expiry with the repository down also keeps serving
        cache.force_expire();
        let served = cache.snapshot().await;
        assert_eq!(served.role_count(), 1);

        // recovery: the forced flag is still set, so the next query
        // picks up the mutation
        repo.set_available(true);
        let recovered = cache.snapshot().await;
        assert_eq!(recovered.role_count(), 2);
    }

    #[tokio::test]
    async fn test_cold_start_with_unreachable_repo_denies_everything() {
        let repo = Arc::new(FlakyRepository::new());
        repo.set_available(false);
        let cache = AccessTreeCache::new(&settings(60_000), repo.clone());

        let empty = cache.snapshot().await;
        assert_eq!(empty.role_count(), 0);

        // nothing was published: recovery builds a real snapshot
        repo.set_available(true);
        repo.inner.upsert_role(role_allowing("operators", "/ca"));
        let built = cache.snapshot().await;
        assert_eq!(built.role_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_share_one_snapshot() {
        let repo = Arc::new(MemoryRoleRepository::new());
        repo.upsert_role(role_allowing("operators", "/ca"));
        let cache = Arc::new(AccessTreeCache::new(&settings(60_000), repo));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.snapshot().await }));
        }
        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap().version());
        }
        // cold-start losers may see the empty snapshot, but any built
        // snapshot is the same version
        assert!(versions.iter().all(|&v| v == 0 || v == 1));

        let settled = cache.snapshot().await;
        assert_eq!(settled.version(), 1);
    }

    #[tokio::test]
    async fn test_merged_tree_is_memoized_per_combination() {
        let repo = Arc::new(MemoryRoleRepository::new());
        repo.upsert_role(role_allowing("a", "/a"));
        repo.upsert_role(role_allowing("b", "/b"));
        let cache = AccessTreeCache::new(&settings(60_000), repo);

        let snapshot = cache.snapshot().await;
        let pair: Vec<&CompiledRole> = snapshot.roles().iter().collect();
        let first = snapshot.merged_tree(&pair);
        let reversed: Vec<&CompiledRole> = snapshot.roles().iter().rev().collect();
        let second = snapshot.merged_tree(&reversed);
        // order-insensitive key: same memoized tree
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.decide("/a/x/"), PermissionState::Allow);
        assert_eq!(first.decide("/b/x/"), PermissionState::Allow);
        assert_eq!(first.decide("/c/"), PermissionState::Deny);
    }
}
