//! Public authorization façade.
//!
//! [`AccessControlService`] owns the cache-refresh policy and the audit
//! side effects around the decision core. Two entry points share the
//! decision logic:
//!
//! - [`AccessControlService::is_authorized`] — audited: an allow emits a
//!   SUCCESS record, an authentication failure emits a FAILURE record. A
//!   plain deny emits only a diagnostic trace; auditing routine
//!   permission checks would flood the audit trail, and the asymmetry is
//!   deliberate.
//! - [`AccessControlService::is_authorized_no_logging`] — identical
//!   decisions, never emits an audit record under any outcome. For
//!   internal checks (UI visibility and the like) that must not pollute
//!   the audit trail.

use std::sync::Arc;

use super::{
    cache::AccessTreeCache,
    engine::AccessDecisionEngine,
    error::AuthzError,
    path,
};
use crate::{
    audit::{AuditKind, AuditRecord, AuditSink, TrustedClock},
    config::AccessConfig,
    roles::{Principal, RoleRepository},
};

pub struct AccessControlService {
    engine: AccessDecisionEngine,
    cache: Arc<AccessTreeCache>,
    clock: Arc<dyn TrustedClock>,
    audit: Arc<dyn AuditSink>,
    audit_enabled: bool,
}

impl AccessControlService {
    pub fn new(
        config: &AccessConfig,
        repo: Arc<dyn RoleRepository>,
        clock: Arc<dyn TrustedClock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine: AccessDecisionEngine::new(config.cache.memoize_merges),
            cache: Arc::new(AccessTreeCache::new(&config.cache, repo)),
            clock,
            audit,
            audit_enabled: config.audit.enabled,
        }
    }

    /// Decide whether `principal` may access `resource`, with audit side
    /// effects.
    pub async fn is_authorized(
        &self,
        principal: &Principal,
        resource: &str,
    ) -> Result<bool, AuthzError> {
        self.check(principal, resource, self.audit_enabled).await
    }

    /// Identical decision logic, no audit records under any outcome.
    pub async fn is_authorized_no_logging(
        &self,
        principal: &Principal,
        resource: &str,
    ) -> Result<bool, AuthzError> {
        self.check(principal, resource, false).await
    }

    /// Invalidate the snapshot cache regardless of TTL. Role management
    /// calls this after any role or rule mutation so administrators
    /// observe their own changes immediately.
    pub fn force_cache_expire(&self) {
        self.cache.force_expire();
    }

    async fn check(
        &self,
        principal: &Principal,
        resource: &str,
        audited: bool,
    ) -> Result<bool, AuthzError> {
        let canonical = path::canonicalize(resource)?;
        let snapshot = self.cache.snapshot().await;

        match self.engine.decide(&snapshot, principal, &canonical) {
            Ok(true) => {
                if audited {
                    self.emit(AuditRecord::new(
                        AuditKind::AccessGranted,
                        principal.subject(),
                        &canonical,
                    ))
                    .await;
                }
                Ok(true)
            }
            Ok(false) => {
                tracing::debug!(
                    subject = %principal.subject(),
                    resource = %canonical,
                    "access denied"
                );
                Ok(false)
            }
            Err(AuthzError::AuthenticationFailed(reason)) => {
                if audited {
                    self.emit(
                        AuditRecord::new(
                            AuditKind::AuthenticationFailure,
                            principal.subject(),
                            &canonical,
                        )
                        .with_detail("reason", reason.as_str()),
                    )
                    .await;
                }
                Err(AuthzError::AuthenticationFailed(reason))
            }
            Err(other) => Err(other),
        }
    }

    /// Emit one audit record. Trusted-time and sink failures degrade to
    /// diagnostics; the decision already made is never affected.
    async fn emit(&self, record: AuditRecord) {
        let timestamp = match self.clock.now() {
            Ok(now) => Some(now),
            Err(e) => {
                tracing::warn!(error = %e, "trusted time unavailable; audit record has no timestamp");
                None
            }
        };
        if let Err(e) = self.audit.log(record.at(timestamp)).await {
            tracing::warn!(error = %e, "audit sink failure; decision unaffected");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        audit::{AuditError, MemoryAuditSink, SystemClock, TimeError},
        authz::{PermissionState, RoleRuleSet},
        roles::{MemberList, MembershipError, MembershipPredicate, MemoryRoleRepository, Role},
    };

    struct RejectsCredential;

    impl MembershipPredicate for RejectsCredential {
        fn matches(&self, _principal: &Principal) -> Result<bool, MembershipError> {
            Err(MembershipError::AuthenticationFailed(
                "malformed credential".to_string(),
            ))
        }
    }

    struct BrokenClock;

    impl TrustedClock for BrokenClock {
        fn now(&self) -> Result<DateTime<Utc>, TimeError> {
            Err(TimeError::Unavailable("ntp quorum lost".to_string()))
        }
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl AuditSink for FailingSink {
        async fn log(&self, _record: AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Sink("disk full".to_string()))
        }
    }

    fn repo_with_operator_role() -> Arc<MemoryRoleRepository> {
        let repo = Arc::new(MemoryRoleRepository::new());
        let mut rules = RoleRuleSet::new();
        rules
            .insert_recursive("/ca", PermissionState::Allow)
            .unwrap();
        rules
            .insert_recursive("/ca/secrets", PermissionState::Deny)
            .unwrap();
        repo.upsert_role(Role::new(
            "ca-operators",
            rules,
            Arc::new(MemberList::new(["alice"])),
        ));
        repo
    }

    fn service_with(
        repo: Arc<MemoryRoleRepository>,
        sink: Arc<MemoryAuditSink>,
    ) -> AccessControlService {
        AccessControlService::new(
            &AccessConfig::default(),
            repo,
            Arc::new(SystemClock),
            sink,
        )
    }

    #[tokio::test]
    async fn test_allow_emits_exactly_one_success_record() {
        let sink = Arc::new(MemoryAuditSink::new());
        let service = service_with(repo_with_operator_role(), sink.clone());
        let alice = Principal::named("alice");

        assert!(service.is_authorized(&alice, "/ca/issue").await.unwrap());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AuditKind::AccessGranted);
        assert_eq!(records[0].principal, "alice");
        assert_eq!(records[0].resource, "/ca/issue/");
        assert!(records[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_plain_deny_emits_no_record() {
        let sink = Arc::new(MemoryAuditSink::new());
        let service = service_with(repo_with_operator_role(), sink.clone());
        let alice = Principal::named("alice");
        let outsider = Principal::named("bob");

        assert!(!service.is_authorized(&alice, "/ca/secrets/hsm").await.unwrap());
        assert!(!service.is_authorized(&outsider, "/ca/issue").await.unwrap());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_authentication_failure_emits_one_failure_record() {
        let repo = Arc::new(MemoryRoleRepository::new());
        repo.upsert_role(Role::new(
            "strict",
            RoleRuleSet::new(),
            Arc::new(RejectsCredential),
        ));
        let sink = Arc::new(MemoryAuditSink::new());
        let service = service_with(repo, sink.clone());

        let result = service
            .is_authorized(&Principal::named("mallory"), "/ca")
            .await;
        assert!(matches!(result, Err(AuthzError::AuthenticationFailed(_))));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AuditKind::AuthenticationFailure);
        assert_eq!(
            records[0].details.get("reason").map(String::as_str),
            Some("malformed credential")
        );
    }

    #[tokio::test]
    async fn test_no_logging_variant_is_always_silent() {
        let repo = repo_with_operator_role();
        repo.upsert_role(Role::new(
            "strict",
            RoleRuleSet::new(),
            Arc::new(RejectsCredential),
        ));
        let sink = Arc::new(MemoryAuditSink::new());
        let service = service_with(repo, sink.clone());
        let alice = Principal::named("alice");

        // allow, deny, and authentication failure: all silent
        let result = service.is_authorized_no_logging(&alice, "/ca/issue").await;
        assert!(matches!(result, Err(AuthzError::AuthenticationFailed(_))));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_audit_disabled_behaves_like_no_logging() {
        let config = AccessConfig::from_toml_str("[audit]\nenabled = false\n").unwrap();
        let sink = Arc::new(MemoryAuditSink::new());
        let service = AccessControlService::new(
            &config,
            repo_with_operator_role(),
            Arc::new(SystemClock),
            sink.clone(),
        );

        assert!(
            service
                .is_authorized(&Principal::named("alice"), "/ca/issue")
                .await
                .unwrap()
        );
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_path_rejected_not_denied() {
        let sink = Arc::new(MemoryAuditSink::new());
        let service = service_with(repo_with_operator_role(), sink.clone());
        let alice = Principal::named("alice");

        for bad in ["", "   ", "ca/issue"] {
            let result = service.is_authorized(&alice, bad).await;
            assert!(matches!(result, Err(AuthzError::InvalidResourcePath(_))));
        }
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_time_failure_degrades_to_timestampless_record() {
        let sink = Arc::new(MemoryAuditSink::new());
        let service = AccessControlService::new(
            &AccessConfig::default(),
            repo_with_operator_role(),
            Arc::new(BrokenClock),
            sink.clone(),
        );

        assert!(
            service
                .is_authorized(&Principal::named("alice"), "/ca/issue")
                .await
                .unwrap()
        );
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].timestamp.is_none());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_alter_decision() {
        let service = AccessControlService::new(
            &AccessConfig::default(),
            repo_with_operator_role(),
            Arc::new(SystemClock),
            Arc::new(FailingSink),
        );

        assert!(
            service
                .is_authorized(&Principal::named("alice"), "/ca/issue")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_force_cache_expire_makes_mutation_visible_immediately() {
        let repo = repo_with_operator_role();
        let sink = Arc::new(MemoryAuditSink::new());
        let service = service_with(repo.clone(), sink);
        let bob = Principal::named("bob");

        assert!(!service.is_authorized(&bob, "/ca/issue").await.unwrap());

        let mut rules = RoleRuleSet::new();
        rules
            .insert_recursive("/ca", PermissionState::Allow)
            .unwrap();
        repo.upsert_role(Role::new(
            "night-shift",
            rules,
            Arc::new(MemberList::new(["bob"])),
        ));

        // default TTL has not elapsed: the mutation is not yet visible
        assert!(!service.is_authorized(&bob, "/ca/issue").await.unwrap());

        service.force_cache_expire();
        assert!(service.is_authorized(&bob, "/ca/issue").await.unwrap());
    }
}
