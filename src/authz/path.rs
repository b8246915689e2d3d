//! Resource path canonicalization and ancestor iteration.
//!
//! Access rules and authorization queries both name resources with
//! slash-delimited paths (`/ca/endentity/revoke`). Storage and lookup go
//! through the same canonical form, so a query issued with or without a
//! trailing separator resolves identically.
//!
//! Canonical form: leading `/`, exactly one trailing `/`, no other
//! rewriting. Paths are case-sensitive. The root path is `/`.

use thiserror::Error;

/// Errors produced when canonicalizing a resource path.
///
/// These indicate programmer error upstream (an empty or non-path-shaped
/// string) and are surfaced as rejected queries, never silently mapped to
/// a deny decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("resource path is empty")]
    Empty,

    #[error("resource path must start with '/': {0:?}")]
    MissingLeadingSlash(String),
}

/// Convert a raw resource path into its canonical form.
///
/// Surrounding whitespace is trimmed. Empty or whitespace-only input and
/// input not starting with `/` are rejected.
///
/// ```
/// use palisade::authz::path::canonicalize;
///
/// assert_eq!(canonicalize("/a/b").unwrap(), "/a/b/");
/// assert_eq!(canonicalize("/a/b/").unwrap(), "/a/b/");
/// assert_eq!(canonicalize("/").unwrap(), "/");
/// assert!(canonicalize("  ").is_err());
/// assert!(canonicalize("a/b").is_err());
/// ```
pub fn canonicalize(path: &str) -> Result<String, PathError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    if !trimmed.starts_with('/') {
        return Err(PathError::MissingLeadingSlash(path.to_string()));
    }

    let mut canonical = trimmed.to_string();
    if !canonical.ends_with('/') {
        canonical.push('/');
    }
    Ok(canonical)
}

/// Strip the trailing separator from a canonical path, yielding the raw
/// spelling (`/a/b/` → `/a/b`). The root path has no raw spelling and is
/// returned unchanged.
pub(crate) fn without_trailing_slash(canonical: &str) -> &str {
    if canonical.len() > 1 {
        &canonical[..canonical.len() - 1]
    } else {
        canonical
    }
}

/// Every ancestor prefix of a canonical path, from the root to the path
/// itself, longest last.
///
/// ```
/// use palisade::authz::path::ancestors;
///
/// assert_eq!(ancestors("/a/b/"), vec!["/", "/a/", "/a/b/"]);
/// assert_eq!(ancestors("/"), vec!["/"]);
/// ```
pub fn ancestors(canonical: &str) -> Vec<&str> {
    canonical
        .char_indices()
        .filter(|&(_, c)| c == '/')
        .map(|(i, _)| &canonical[..=i])
        .collect()
}

/// The path segments of a canonical path, in order. The root path has no
/// segments. Interior empty segments are preserved so that `/a//` and
/// `/a/` remain distinct resources.
pub(crate) fn segments(canonical: &str) -> Vec<&str> {
    if canonical == "/" {
        return Vec::new();
    }
    canonical[1..canonical.len() - 1].split('/').collect()
}
