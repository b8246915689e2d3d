//! Per-role access rule sets and their resolution semantics.
//!
//! A [`RoleRuleSet`] maps resource paths to [`AccessRule`]s. Resolution
//! uses longest-ancestor-prefix matching: an exact rule governs its path
//! outright; a recursive rule additionally governs every descendant path
//! unless a more specific rule overrides it. The absence of a governing
//! rule resolves to [`PermissionState::Deny`] — no resource, including the
//! root path, is ever implicitly allowed.
//!
//! Rule sets support two rewriting operations, both of which preserve the
//! resolution of every possible query path:
//!
//! - [`RoleRuleSet::normalize`] rewrites stored keys into canonical form
//!   (`/a/b` and `/a/b/` become the same stored representation).
//! - [`RoleRuleSet::minimize`] removes rules made redundant by an ancestor
//!   rule or by the default deny, iterating to a fixpoint.
//!
//! [`merge_total_access`] combines two rule sets with OR semantics across
//! roles: a path is allowed in the merged set if either input resolves it
//! to allow.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::path::{self, PathError};

/// The decision state carried by a rule, and the outcome of resolution.
///
/// There is no "unset" state at resolution time; the absence of a
/// governing rule resolves to `Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Allow,
    Deny,
}

impl PermissionState {
    /// OR-combine two states: allow wins.
    pub fn or(self, other: PermissionState) -> PermissionState {
        if self == PermissionState::Allow || other == PermissionState::Allow {
            PermissionState::Allow
        } else {
            PermissionState::Deny
        }
    }

    pub fn is_allow(self) -> bool {
        self == PermissionState::Allow
    }
}

/// A single access rule: a decision state plus a recursion flag.
///
/// A recursive rule governs its path and everything below it unless a more
/// specific rule overrides it; a non-recursive rule governs only the exact
/// path it is keyed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub state: PermissionState,
    pub recursive: bool,
}

impl AccessRule {
    pub fn recursive(state: PermissionState) -> Self {
        Self {
            state,
            recursive: true,
        }
    }

    pub fn exact(state: PermissionState) -> Self {
        Self {
            state,
            recursive: false,
        }
    }
}

/// A role's mapping from resource path to access rule.
///
/// Keys are unique paths; insertion order is irrelevant. Every key is
/// validated at insertion (non-empty, starts with `/`). The engine treats
/// a rule set as an immutable snapshot for the duration of a resolution;
/// mutation belongs to the role-management side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleRuleSet {
    rules: HashMap<String, AccessRule>,
}

impl RoleRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule at `resource`, replacing any rule stored under the
    /// same spelling. The key is stored as given; `normalize` rewrites
    /// spellings later.
    pub fn insert(&mut self, resource: &str, rule: AccessRule) -> Result<(), PathError> {
        // Validate only; keep the caller's spelling.
        path::canonicalize(resource)?;
        self.rules.insert(resource.trim().to_string(), rule);
        Ok(())
    }

    /// Convenience: insert a recursive rule.
    pub fn insert_recursive(
        &mut self,
        resource: &str,
        state: PermissionState,
    ) -> Result<(), PathError> {
        self.insert(resource, AccessRule::recursive(state))
    }

    /// Convenience: insert a non-recursive rule.
    pub fn insert_exact(
        &mut self,
        resource: &str,
        state: PermissionState,
    ) -> Result<(), PathError> {
        self.insert(resource, AccessRule::exact(state))
    }

    pub fn remove(&mut self, resource: &str) -> Option<AccessRule> {
        self.rules.remove(resource.trim())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate over the stored rules under their stored spellings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AccessRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether every rule is recursive. Only then is a materialized
    /// OR-merge of two sets resolution-equivalent to OR-ing their
    /// resolutions at every path, not just at the explicit keys: a
    /// non-recursive rule contributes its state at its own key but not
    /// below it, which a merged recursive rule cannot represent.
    pub fn is_fully_recursive(&self) -> bool {
        self.rules.values().all(|rule| rule.recursive)
    }

    /// The stored rules rewritten under canonical keys.
    ///
    /// When a raw and a canonical spelling of the same path are both
    /// present, the canonical spelling's rule wins — the same precedence
    /// lookup applies, so the rewrite cannot change any resolution.
    pub(crate) fn canonical_rules(&self) -> HashMap<String, AccessRule> {
        let mut canonical = HashMap::with_capacity(self.rules.len());
        for (key, rule) in &self.rules {
            if key.ends_with('/') {
                canonical.insert(key.clone(), *rule);
            }
        }
        for (key, rule) in &self.rules {
            if !key.ends_with('/') {
                canonical.entry(format!("{key}/")).or_insert(*rule);
            }
        }
        canonical
    }

    /// Resolve the effective decision for `resource`.
    ///
    /// The query is canonicalized, then matched against the stored rules:
    /// an exact match wins regardless of its recursion flag; otherwise the
    /// deepest recursive ancestor rule wins; otherwise the result is
    /// `Deny`. Lookup consults both the canonical and the separator-less
    /// spelling of each prefix, so the same answer comes back whether or
    /// not the set has been normalized.
    pub fn resolve(&self, resource: &str) -> Result<PermissionState, PathError> {
        let canonical = path::canonicalize(resource)?;
        Ok(self.resolve_canonical(&canonical))
    }

    /// Resolution core over an already-canonical query path.
    pub(crate) fn resolve_canonical(&self, canonical: &str) -> PermissionState {
        for prefix in path::ancestors(canonical).into_iter().rev() {
            let exact = prefix == canonical;
            if let Some(rule) = self.lookup(prefix) {
                if exact || rule.recursive {
                    return rule.state;
                }
            }
        }
        PermissionState::Deny
    }

    /// Look up a canonical prefix under either stored spelling, canonical
    /// spelling first.
    fn lookup(&self, canonical_prefix: &str) -> Option<&AccessRule> {
        if let Some(rule) = self.rules.get(canonical_prefix) {
            return Some(rule);
        }
        let raw = path::without_trailing_slash(canonical_prefix);
        if raw != canonical_prefix {
            return self.rules.get(raw);
        }
        None
    }

    /// Rewrite every stored key into canonical form.
    ///
    /// For every query path p, `resolve(p)` before and after this call
    /// returns the identical result.
    pub fn normalize(&mut self) {
        self.rules = self.canonical_rules();
    }

    /// Remove rules whose removal leaves every resolution unchanged,
    /// repeating until no further rule qualifies.
    ///
    /// A candidate removal is committed only if resolution at every
    /// explicit key of the pre-minimization set still matches the
    /// pre-minimization resolver. Checking the explicit keys is sufficient
    /// for equivalence over all query paths: a removal can only reroute
    /// queries that previously resolved to the removed rule, and those all
    /// land on the same ancestor the removed key itself now resolves to.
    ///
    /// Candidates are visited deepest first, then lexicographically, and
    /// full passes repeat until a pass removes nothing. Never adds rules,
    /// never changes any resolution, and is idempotent.
    pub fn minimize(&mut self) {
        let reference = self.clone();
        let checkpoints: Vec<String> = reference.canonical_rules().into_keys().collect();

        loop {
            let mut removed_any = false;
            let mut candidates: Vec<String> = self.rules.keys().cloned().collect();
            candidates.sort_by(|a, b| {
                // depth is spelling-independent: /a/b and /a/b/ sort equal
                let depth = |k: &str| k.trim_end_matches('/').matches('/').count();
                depth(b).cmp(&depth(a)).then_with(|| a.cmp(b))
            });

            for key in candidates {
                let Some(rule) = self.rules.remove(&key) else {
                    continue;
                };
                let safe = checkpoints
                    .iter()
                    .all(|p| self.resolve_canonical(p) == reference.resolve_canonical(p));
                if safe {
                    removed_any = true;
                } else {
                    self.rules.insert(key, rule);
                }
            }

            if !removed_any {
                break;
            }
        }
    }
}

/// OR-merge two rule sets into the combined entitlement of a principal
/// matching both roles.
///
/// For the union of explicit keys present in either input, the merged set
/// stores an explicit recursive rule whose state is
/// `OR(a.resolve(k), b.resolve(k))`. Keys not explicit in either input are
/// left unrepresented; their resolution falls through to an ancestor rule
/// in the merged output, or to the default deny. The merge does not
/// minimize its output.
///
/// Commutative, and associative under pairwise application.
pub fn merge_total_access(a: &RoleRuleSet, b: &RoleRuleSet) -> RoleRuleSet {
    let mut keys: BTreeSet<String> = a.canonical_rules().into_keys().collect();
    keys.extend(b.canonical_rules().into_keys());

    let mut merged = RoleRuleSet::new();
    for key in keys {
        let state = a.resolve_canonical(&key).or(b.resolve_canonical(&key));
        merged
            .rules
            .insert(key, AccessRule::recursive(state));
    }
    merged
}
