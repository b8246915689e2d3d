//! Authorization errors.

use thiserror::Error;

use super::path::PathError;
use crate::roles::MembershipError;

/// Errors a caller of the authorization entry points can receive.
///
/// Infrastructure failures (cache rebuild, audit sink, trusted time) are
/// recovered locally and never surface here; the caller only ever sees a
/// boolean decision or one of these conditions.
#[derive(Debug, Clone, Error)]
pub enum AuthzError {
    /// The query named a malformed resource path. Rejected rather than
    /// silently denied: it indicates programmer error upstream.
    #[error("invalid resource path: {0}")]
    InvalidResourcePath(#[from] PathError),

    /// The principal's credential could not be validated during role
    /// matching. Distinct from an ordinary deny for audit purposes.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
}

impl From<MembershipError> for AuthzError {
    fn from(e: MembershipError) -> Self {
        match e {
            MembershipError::AuthenticationFailed(reason) => {
                AuthzError::AuthenticationFailed(reason)
            }
        }
    }
}
