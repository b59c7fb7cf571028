//! Permission membership check.

use super::{AuthFailureKind, AuthorizationOutcome, Denied, VerifiedClaims};

/// Authorize `claims` for `required` by exact string membership.
///
/// No wildcard, prefix or hierarchical matching: `get:items` does not imply
/// `get:item`, and `*` is just another string.
pub fn check(claims: VerifiedClaims, required: &str) -> AuthorizationOutcome {
    if claims.has_permission(required) {
        Ok(claims)
    } else {
        Err(Denied::new(
            AuthFailureKind::InsufficientPermission,
            format!("permission '{required}' not granted"),
        ))
    }
}
