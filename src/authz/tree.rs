//! Compiled per-role resolvers.
//!
//! A [`CompiledAccessTree`] is derived from a [`RoleRuleSet`] and answers
//! the same resolution queries in O(depth) segment hops instead of
//! re-scanning the rule map. Trees are immutable once built; the snapshot
//! cache replaces them wholesale when the underlying roles change.

use std::collections::HashMap;

use super::{
    path,
    rules::{AccessRule, PermissionState, RoleRuleSet},
};

#[derive(Debug, Default)]
struct Node {
    rule: Option<AccessRule>,
    children: HashMap<String, Node>,
}

/// Segment trie over a rule set's canonical keys.
#[derive(Debug, Default)]
pub struct CompiledAccessTree {
    root: Node,
}

impl CompiledAccessTree {
    /// Compile a rule set into a tree. Resolution equivalence with
    /// [`RoleRuleSet::resolve`] holds for every query path.
    pub fn compile(rules: &RoleRuleSet) -> Self {
        let mut root = Node::default();
        for (key, rule) in rules.canonical_rules() {
            let mut node = &mut root;
            for segment in path::segments(&key) {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.rule = Some(rule);
        }
        Self { root }
    }

    /// Decide an already-canonical query path.
    ///
    /// Walks the trie tracking the deepest governing rule: an exact-depth
    /// rule governs regardless of its recursion flag, an ancestor rule
    /// governs only if recursive. Falls through to `Deny`.
    pub fn decide(&self, canonical: &str) -> PermissionState {
        let segments = path::segments(canonical);
        let mut node = &self.root;
        let mut decision = None;

        if let Some(rule) = &node.rule {
            if rule.recursive || segments.is_empty() {
                decision = Some(rule.state);
            }
        }
        for (i, segment) in segments.iter().enumerate() {
            match node.children.get(*segment) {
                None => break,
                Some(child) => {
                    node = child;
                    let exact = i + 1 == segments.len();
                    if let Some(rule) = &node.rule {
                        if rule.recursive || exact {
                            decision = Some(rule.state);
                        }
                    }
                }
            }
        }
        decision.unwrap_or(PermissionState::Deny)
    }
}
