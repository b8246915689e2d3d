//! Access decision engine.
//!
//! Combines the decisions of every role matching a principal with OR
//! semantics: access is granted iff at least one matching role resolves
//! the resource to allow. Two evaluation strategies exist — resolve each
//! matching role's tree and OR the booleans, or resolve once against the
//! snapshot's memoized OR-merged tree for the combination. The merged
//! strategy is used only where it is resolution-equivalent (purely
//! recursive rule sets); either way the observable decisions are
//! identical.

use super::{
    cache::{AccessSnapshot, CompiledRole},
    error::AuthzError,
};
use crate::roles::Principal;

/// Stateless decision core. Strategy selection is the only knob.
pub struct AccessDecisionEngine {
    memoize_merges: bool,
}

impl AccessDecisionEngine {
    pub fn new(memoize_merges: bool) -> Self {
        Self { memoize_merges }
    }

    /// Decide whether `principal` may access the canonical resource path.
    ///
    /// A membership predicate reporting an unvalidatable credential
    /// aborts the decision with `AuthenticationFailed` — that outcome is
    /// never silently mapped to a deny, so the caller can audit it.
    pub fn decide(
        &self,
        snapshot: &AccessSnapshot,
        principal: &Principal,
        canonical_resource: &str,
    ) -> Result<bool, AuthzError> {
        let mut matching: Vec<&CompiledRole> = Vec::new();
        for compiled in snapshot.roles() {
            match compiled.role().matches(principal) {
                Ok(true) => matching.push(compiled),
                Ok(false) => {}
                Err(e) => return Err(e.into()),
            }
        }

        match matching.as_slice() {
            [] => Ok(false),
            [only] => Ok(only.tree().decide(canonical_resource).is_allow()),
            // A materialized merge is only resolution-equivalent when every
            // participating rule set is purely recursive; otherwise OR the
            // per-role resolutions directly.
            several
                if self.memoize_merges
                    && several.iter().all(|compiled| compiled.fully_recursive()) =>
            {
                Ok(snapshot
                    .merged_tree(several)
                    .decide(canonical_resource)
                    .is_allow())
            }
            several => Ok(several
                .iter()
                .any(|compiled| compiled.tree().decide(canonical_resource).is_allow())),
        }
    }
}
